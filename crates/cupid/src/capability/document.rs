//! Date-plan generation exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Capability, CapabilityError, CapabilityKind, CapabilityResult};
use crate::api::DocumentResponse;
use crate::document::{DatePlanRequest, DocumentGateway, GenerationError};
use crate::llm::ToolDefinition;

pub const DATE_PLAN_CAPABILITY: &str = "create_date_plan";

/// Prefix under which artifacts are downloadable.
pub const ARTIFACT_ROUTE_PREFIX: &str = "/api/artifacts/";

pub struct DatePlanCapability {
    gateway: Arc<DocumentGateway>,
}

impl DatePlanCapability {
    pub fn new(gateway: Arc<DocumentGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Capability for DatePlanCapability {
    fn name(&self) -> &str {
        DATE_PLAN_CAPABILITY
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::DocumentGeneration
    }

    fn definition(&self) -> ToolDefinition {
        let text = json!({"type": "string"});
        ToolDefinition::function(
            DATE_PLAN_CAPABILITY,
            "Generate a downloadable date plan document (restaurant booking, activity \
             schedule, gift list, notes). Use when the user asks for a date or holiday plan \
             document. Tell the user the returned artifact_id so they can download it.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Document title, e.g. \"七夕约会计划\""},
                    "restaurant": {
                        "type": "object",
                        "properties": {
                            "name": text, "time": text, "address": text, "phone": text
                        }
                    },
                    "schedule": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"time": text, "activity": text, "location": text}
                        }
                    },
                    "gifts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"name": text, "price": text, "status": text}
                        }
                    },
                    "notes": {"type": "string"}
                },
                "required": ["title"]
            }),
        )
    }

    async fn invoke(&self, arguments: &Value) -> Result<CapabilityResult, CapabilityError> {
        let request = DatePlanRequest::from_arguments(arguments).map_err(|e| match e {
            GenerationError::Validation(msg) => CapabilityError::InvalidArguments(msg),
            other => CapabilityError::Failed(other.to_string()),
        })?;

        let artifact = self
            .gateway
            .generate(&request)
            .await
            .map_err(|e| CapabilityError::Failed(format!("document generation failed: {e}")))?;

        let response = DocumentResponse {
            success: true,
            message: format!("文档生成成功! 文件名: {}", artifact.artifact_id),
            artifact_id: artifact.artifact_id.clone(),
            display_name: artifact.display_name.clone(),
        };
        let content = serde_json::to_string(&response)
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        // Downstream consumers get a resolvable reference instead of raw fields.
        let relayed = json!({
            "title": request.title,
            "artifact": {
                "artifact_id": artifact.artifact_id,
                "display_name": artifact.display_name,
                "byte_size": artifact.byte_size,
                "created_at": artifact.created_at.to_rfc3339(),
                "download_url": format!("{ARTIFACT_ROUTE_PREFIX}{}", artifact.artifact_id),
            }
        });

        Ok(CapabilityResult {
            content,
            relayed_arguments: Some(relayed),
        })
    }
}
