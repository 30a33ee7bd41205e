use crate::error::ResourceRef;
use crate::models::LabelDraft;
use super::path_segment;
use crate::transport::ApiRequest;

const LABELS_PATH: &str = "/users/me/labels";

pub fn target(id: &str) -> ResourceRef {
    ResourceRef::new("label", id)
}

pub fn collection() -> ResourceRef {
    ResourceRef::collection("label")
}

pub fn list() -> ApiRequest {
    ApiRequest::get(LABELS_PATH)
}

pub fn get(id: &str) -> ApiRequest {
    ApiRequest::get(format!("{}/{}", LABELS_PATH, path_segment(id)))
}

pub fn create(draft: &LabelDraft) -> ApiRequest {
    ApiRequest::post(LABELS_PATH, draft.to_api_value())
}

/// Full replacement of the label's mutable fields
pub fn update(id: &str, draft: &LabelDraft) -> ApiRequest {
    let mut body = draft.to_api_value();
    body["id"] = serde_json::json!(id);
    ApiRequest::put(format!("{}/{}", LABELS_PATH, path_segment(id)), body)
}

pub fn delete(id: &str) -> ApiRequest {
    ApiRequest::delete(format!("{}/{}", LABELS_PATH, path_segment(id)))
}
