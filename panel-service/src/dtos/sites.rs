use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSiteRequest {
    #[validate(length(min = 1, max = 200, message = "Site name is required"))]
    #[schema(example = "Acme")]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "Site slug is required"))]
    #[schema(example = "acme")]
    pub slug: String,

    /// Initial content, defaults to `{}`.
    #[schema(value_type = Option<Object>)]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateContentRequest {
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
}
