use crate::unmixing_pipeline::analysis::ClinicalScore;
use crate::unmixing_pipeline::calibration::Chromophore;
use crate::unmixing_pipeline::loader::WavelengthSource;

/// Inputs of one run. Owned by the caller and never modified.
#[derive(Debug, Clone)]
pub struct UnmixingRequest {
    /// Names the output subdirectory and the session lock
    pub session_id: String,
    pub images: Vec<WavelengthSource>,
    /// White-standard captures, one per wavelength, or empty for none
    pub references: Vec<WavelengthSource>,
    pub chromophores: Vec<Chromophore>,
    /// Optional clinical score weighting the treatment estimate
    pub clinical_score: Option<ClinicalScore>,
}

impl UnmixingRequest {
    pub fn new(
        session_id: impl Into<String>,
        images: Vec<WavelengthSource>,
        chromophores: Vec<Chromophore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            images,
            references: Vec::new(),
            chromophores,
            clinical_score: None,
        }
    }

    pub fn with_references(mut self, references: Vec<WavelengthSource>) -> Self {
        self.references = references;
        self
    }

    pub fn with_clinical_score(mut self, score: Option<ClinicalScore>) -> Self {
        self.clinical_score = score;
        self
    }

    /// Chromophores in ascending id order.
    pub fn sorted_chromophores(&self) -> Vec<Chromophore> {
        let mut chromophores = self.chromophores.clone();
        chromophores.sort_by_key(|c| c.id);
        chromophores
    }
}
