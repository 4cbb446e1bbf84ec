//! Request body for create/update: `multipart/form-data` with `images` file
//! parts, or a plain JSON object of record fields.

use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use herbarium_media::UploadEntry;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ServerError;

const IMAGES_FIELD: &str = "images";
const DESCRIPTIONS_FIELD: &str = "imageDescriptions";

#[derive(Debug, Default)]
pub struct SpecimenForm {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadEntry>,
    pub descriptions: Option<Vec<String>>,
}

impl<S> FromRequest<S> for SpecimenForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);

        let mut form = match content_type.as_deref() {
            None => SpecimenForm::default(),
            Some(ct) if ct.starts_with("multipart/form-data") => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(|e| ServerError::Validation(e.body_text()))?;
                read_multipart(multipart).await?
            }
            Some(_) => {
                let Json(fields) = Json::<Map<String, Value>>::from_request(req, state)
                    .await
                    .map_err(|e| ServerError::Validation(e.body_text()))?;
                SpecimenForm {
                    fields,
                    ..SpecimenForm::default()
                }
            }
        };

        form.decode_embedded()?;
        Ok(form)
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<SpecimenForm, ServerError> {
    let mut form = SpecimenForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            if name != IMAGES_FIELD {
                debug!(field = %name, "Ignoring unexpected file part");
                continue;
            }
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            form.files.push(UploadEntry {
                original_name: file_name,
                content_type,
                data,
            });
            continue;
        }

        let text = field.text().await.map_err(multipart_error)?;
        if name == DESCRIPTIONS_FIELD || name == "imageDescriptions[]" {
            form.descriptions.get_or_insert_with(Vec::new).push(text);
        } else {
            form.fields.insert(name, Value::String(text));
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(err.body_text())
    } else {
        ServerError::Validation(err.body_text())
    }
}

impl SpecimenForm {
    /// `taxonomy` and `permit` may arrive as JSON text. A bad taxonomy
    /// rejects the request; a bad permit is dropped.
    fn decode_embedded(&mut self) -> Result<(), ServerError> {
        if let Some(raw) = string_field(&self.fields, "taxonomy") {
            match serde_json::from_str::<Value>(&raw) {
                Ok(parsed @ Value::Object(_)) => {
                    self.fields.insert("taxonomy".into(), parsed);
                }
                Ok(_) => {
                    return Err(ServerError::Validation(
                        "taxonomy must be a JSON object".into(),
                    ))
                }
                Err(e) => {
                    return Err(ServerError::Validation(format!(
                        "taxonomy is not valid JSON: {e}"
                    )))
                }
            }
        }

        if let Some(raw) = string_field(&self.fields, "permit") {
            match serde_json::from_str::<Value>(&raw) {
                Ok(parsed @ Value::Object(_)) => {
                    self.fields.insert("permit".into(), parsed);
                }
                _ => {
                    warn!("Discarding unparseable permit field");
                    self.fields.remove("permit");
                }
            }
        }

        // JSON bodies may carry descriptions as a list or a single string.
        match self.fields.remove(DESCRIPTIONS_FIELD) {
            Some(Value::String(single)) => {
                self.descriptions.get_or_insert_with(Vec::new).push(single);
            }
            Some(Value::Array(items)) => {
                let list = self.descriptions.get_or_insert_with(Vec::new);
                list.extend(items.into_iter().map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                }));
            }
            _ => {}
        }

        Ok(())
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(raw)) => Some(raw.clone()),
        _ => None,
    }
}
