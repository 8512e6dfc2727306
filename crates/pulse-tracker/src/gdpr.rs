//! GDPR basis-for-processing entity.

use pulse_types::{schemas, SelfDescribingJson};
use serde_json::{Map, Value};

/// Legal basis under which events are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Consent,
    Contract,
    LegalObligation,
    VitalInterests,
    PublicTask,
    LegitimateInterests,
}

impl Basis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::Contract => "contract",
            Self::LegalObligation => "legal_obligation",
            Self::VitalInterests => "vital_interests",
            Self::PublicTask => "public_task",
            Self::LegitimateInterests => "legitimate_interests",
        }
    }
}

/// Attached to every event while enabled on a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdprContext {
    pub basis: Basis,
    pub document_id: Option<String>,
    pub document_version: Option<String>,
    pub document_description: Option<String>,
}

impl GdprContext {
    pub fn new(basis: Basis) -> Self {
        Self {
            basis,
            document_id: None,
            document_version: None,
            document_description: None,
        }
    }

    pub fn document(
        mut self,
        id: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.document_id = Some(id.into());
        self.document_version = Some(version.into());
        self.document_description = Some(description.into());
        self
    }

    pub fn entity(&self) -> SelfDescribingJson {
        let mut data = Map::new();
        data.insert(
            "basisForProcessing".to_string(),
            Value::String(self.basis.as_str().to_string()),
        );
        let optional = [
            ("documentId", &self.document_id),
            ("documentVersion", &self.document_version),
            ("documentDescription", &self.document_description),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                data.insert(key.to_string(), Value::String(v.clone()));
            }
        }
        SelfDescribingJson::new(schemas::GDPR, data)
    }
}
