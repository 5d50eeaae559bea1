//! Canonical posting types shared by adapters, the upsert engine and stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A job posting mapped from a provider payload into the canonical shape.
///
/// Identity is `(source_slug, external_id)`; two postings with the same pair
/// are the same posting regardless of any other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    pub source_slug: String,
    pub external_id: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub remote_type: Option<String>,
    /// Provider's date string, kept verbatim. Parsed only by the freshness filter.
    pub posted_date: Option<String>,
    pub external_url: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub description: Option<String>,
    /// The provider's original record.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl NormalizedJob {
    /// Creates a posting with only its identity and title set.
    pub fn new(
        source_slug: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_slug: source_slug.into(),
            external_id: external_id.into(),
            title: title.into(),
            company: None,
            location: None,
            employment_type: None,
            remote_type: None,
            posted_date: None,
            external_url: None,
            salary_min: None,
            salary_max: None,
            description: None,
            raw: serde_json::Value::Null,
        }
    }

    /// The `(source_slug, external_id)` identity pair.
    pub fn key(&self) -> (&str, &str) {
        (&self.source_slug, &self.external_id)
    }
}

/// Seniority band inferred from a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Lead,
    Principal,
    Executive,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intern => "intern",
            Self::Junior => "junior",
            Self::Mid => "mid",
            Self::Senior => "senior",
            Self::Lead => "lead",
            Self::Principal => "principal",
            Self::Executive => "executive",
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum education level a posting asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Associate,
    Bachelor,
    Master,
    Doctorate,
}

impl EducationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighSchool => "high_school",
            Self::Associate => "associate",
            Self::Bachelor => "bachelor",
            Self::Master => "master",
            Self::Doctorate => "doctorate",
        }
    }
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes derived from a posting's title and description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnrichment {
    pub seniority: Option<Seniority>,
    pub experience_min_years: Option<u32>,
    pub experience_max_years: Option<u32>,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub education_level: Option<EducationLevel>,
    pub industry: Option<String>,
}

/// A posting ready for the store: canonical fields plus derived attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedJob {
    pub job: NormalizedJob,
    pub enrichment: JobEnrichment,
    /// Trust level of the source, copied from its policy.
    pub trust_level: crate::config::TrustLevel,
}
