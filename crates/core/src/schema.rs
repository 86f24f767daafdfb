//! Typed views over the gallery's JSON documents.
//!
//! Every typed value keeps the verbatim JSON object it was parsed from,
//! so sidecars can be written back exactly as the server returned them.
//! Only the fields the mirror actually reads are modelled; everything
//! else rides along in the document.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::SchemaError;

/// A JSON object with key order preserved.
pub type Document = serde_json::Map<String, Value>;

/// `inferenceType` tag of upscaling jobs, which carry no model attribution.
pub const INFERENCE_TYPE_UPSCALING: &str = "UPSCALING";

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Pagination block returned with every gallery page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    pub has_next_page: bool,
    /// Server-reported total.  Known to be unreliable; informational only.
    #[serde(default)]
    pub total_items: Option<u64>,
}

/// One fetched page of the gallery.
#[derive(Debug, Clone)]
pub struct GalleryPage {
    pub items: Vec<InferenceGroup>,
    pub pagination: PaginationMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageWire {
    items: Vec<Document>,
    pagination_metadata: PaginationMetadata,
}

impl GalleryPage {
    /// Parse a raw page body.
    pub fn from_slice(body: &[u8]) -> Result<Self, SchemaError> {
        let wire: PageWire = serde_json::from_slice(body)?;
        let items = wire
            .items
            .into_iter()
            .enumerate()
            .map(|(idx, doc)| InferenceGroup::from_document(doc).map_err(|e| at_index(e, idx)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            items,
            pagination: wire.pagination_metadata,
        })
    }

    /// Number of images across all groups on this page.
    pub fn image_count(&self) -> usize {
        self.items.iter().map(|g| g.images.len()).sum()
    }
}

fn at_index(err: SchemaError, idx: usize) -> SchemaError {
    match err {
        SchemaError::Invalid { context, source } => SchemaError::Invalid {
            context: format!("{context} (item {idx})"),
            source,
        },
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Inference group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceKind {
    Upscaling,
    Other(String),
}

impl InferenceKind {
    fn from_tag(tag: String) -> Self {
        if tag == INFERENCE_TYPE_UPSCALING {
            Self::Upscaling
        } else {
            Self::Other(tag)
        }
    }
}

/// Model references of a generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferencePayload {
    pub model_id: Option<String>,
    /// Secondary "style" models.
    pub lora: Vec<String>,
}

/// The models a non-upscaling job must be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRefs<'a> {
    pub styles: &'a [String],
    pub primary: &'a str,
}

/// One generation job and the images it produced.
#[derive(Debug, Clone)]
pub struct InferenceGroup {
    pub id: String,
    pub kind: InferenceKind,
    pub payload: Option<InferencePayload>,
    pub images: Vec<ImageItem>,
    document: Document,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupWire {
    #[serde(deserialize_with = "id_string")]
    inference_id: String,
    inference_type: String,
    #[serde(default)]
    inference_payload: Option<PayloadWire>,
    images: Vec<Document>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadWire {
    #[serde(default, deserialize_with = "opt_id_string")]
    model_id: Option<String>,
    #[serde(default)]
    lora: Option<Vec<LoraWire>>,
}

#[derive(Deserialize)]
struct LoraWire {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

impl InferenceGroup {
    pub fn from_document(document: Document) -> Result<Self, SchemaError> {
        let wire: GroupWire =
            serde_json::from_value(Value::Object(document.clone())).map_err(|source| {
                SchemaError::Invalid {
                    context: "inference group".to_string(),
                    source,
                }
            })?;

        let images = wire
            .images
            .into_iter()
            .map(ImageItem::from_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| match e {
                SchemaError::Invalid { context, source } => SchemaError::Invalid {
                    context: format!("{context} of inference {}", wire.inference_id),
                    source,
                },
                other => other,
            })?;

        let payload = wire.inference_payload.map(|p| InferencePayload {
            model_id: p.model_id,
            lora: p
                .lora
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.id)
                .collect(),
        });

        Ok(Self {
            id: wire.inference_id,
            kind: InferenceKind::from_tag(wire.inference_type),
            payload,
            images,
            document,
        })
    }

    /// The group exactly as the server returned it, images included.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The group document minus its `images` array.
    pub fn document_without_images(&self) -> Document {
        self.document
            .iter()
            .filter(|(key, _)| key.as_str() != "images")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_upscaling(&self) -> bool {
        self.kind == InferenceKind::Upscaling
    }

    /// Models to resolve for attribution, or `None` for upscaling jobs.
    ///
    /// Any other job must name a primary model.
    pub fn model_refs(&self) -> Result<Option<ModelRefs<'_>>, SchemaError> {
        if self.is_upscaling() {
            return Ok(None);
        }

        let payload = self.payload.as_ref().ok_or_else(|| SchemaError::MissingField {
            context: format!("inference {}", self.id),
            field: "inferencePayload",
        })?;
        let primary = payload
            .model_id
            .as_deref()
            .ok_or_else(|| SchemaError::MissingField {
                context: format!("inference {}", self.id),
                field: "inferencePayload.modelId",
            })?;

        Ok(Some(ModelRefs {
            styles: &payload.lora,
            primary,
        }))
    }
}

// ---------------------------------------------------------------------------
// Image item
// ---------------------------------------------------------------------------

/// One produced image.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub id: String,
    pub url: String,
    /// Raw `createdAt` value, e.g. `2024-04-04T23:29:15.431843Z`.
    pub created_at: String,
    document: Document,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageWire {
    #[serde(deserialize_with = "id_string")]
    id: String,
    url: String,
    created_at: String,
}

impl ImageItem {
    pub fn from_document(document: Document) -> Result<Self, SchemaError> {
        let wire: ImageWire = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|source| SchemaError::Invalid {
                context: "image".to_string(),
                source,
            })?;

        Ok(Self {
            id: wire.id,
            url: wire.url,
            created_at: wire.created_at,
            document,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// `createdAt` as a UTC instant.
    pub fn created_at_utc(&self) -> Result<DateTime<Utc>, SchemaError> {
        parse_utc_timestamp(&self.created_at)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an ISO-8601 timestamp carrying a trailing `Z` zone designator.
///
/// The designator is stripped and the remainder read as UTC wall time,
/// never local time.  Timestamps with an explicit numeric offset are
/// accepted as well and normalised to UTC.
pub fn parse_utc_timestamp(value: &str) -> Result<DateTime<Utc>, SchemaError> {
    let naive = value.strip_suffix(&['Z', 'z'][..]).unwrap_or(value);
    match naive.parse::<NaiveDateTime>() {
        Ok(dt) => Ok(dt.and_utc()),
        Err(source) => DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| SchemaError::Timestamp {
                value: value.to_string(),
                source,
            }),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Str(String),
    Int(i64),
    UInt(u64),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Str(s) => s,
            IdRepr::Int(n) => n.to_string(),
            IdRepr::UInt(n) => n.to_string(),
        }
    }
}

/// Accept ids sent either as JSON strings or integers.
fn id_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    IdRepr::deserialize(de).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(de)?.map(String::from))
}
