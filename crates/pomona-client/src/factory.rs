//! Adapter factory and enum dispatch.
//!
//! This module provides a unified interface for working with the provider
//! adapters through the [`SourceAdapterEnum`] enum.
//!
//! # Why an Enum Instead of `dyn Trait`?
//!
//! The ingestion services are generic over [`AdapterFactory::Adapter`], so an
//! enum keeps every call statically dispatched and lets adapters stay plain
//! `Clone` values with no boxing. Adding a provider means one variant here
//! and one arm in [`AdapterFactoryEnum::create`].

use pomona_core::adapter::{
    AdapterFactory, FetchPlan, FetchRequest, Headers, RawPayload, SourceAdapter,
};
use pomona_core::config::{AdapterKind, SourceEntry};
use pomona_core::credentials::{CredentialProvider, EnvCredentials};
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use pomona_core::rotation::CompanyTarget;

use crate::adzuna::AdzunaAdapter;
use crate::greenhouse::GreenhouseAdapter;
use crate::jooble::JoobleAdapter;
use crate::lever::LeverAdapter;
use crate::reed::ReedAdapter;
use crate::rss::RssAdapter;
use crate::theirstack::TheirStackAdapter;
use crate::themuse::TheMuseAdapter;
use crate::usajobs::UsaJobsAdapter;

/// Unified adapter that wraps the concrete provider implementations.
#[derive(Debug, Clone)]
pub enum SourceAdapterEnum {
    Adzuna(AdzunaAdapter),
    Jooble(JoobleAdapter),
    UsaJobs(UsaJobsAdapter),
    Reed(ReedAdapter),
    TheMuse(TheMuseAdapter),
    TheirStack(TheirStackAdapter),
    Rss(RssAdapter),
    Greenhouse(GreenhouseAdapter),
    Lever(LeverAdapter),
}

macro_rules! dispatch {
    ($self:ident, $a:ident => $call:expr) => {
        match $self {
            Self::Adzuna($a) => $call,
            Self::Jooble($a) => $call,
            Self::UsaJobs($a) => $call,
            Self::Reed($a) => $call,
            Self::TheMuse($a) => $call,
            Self::TheirStack($a) => $call,
            Self::Rss($a) => $call,
            Self::Greenhouse($a) => $call,
            Self::Lever($a) => $call,
        }
    };
}

impl SourceAdapter for SourceAdapterEnum {
    fn slug(&self) -> &str {
        dispatch!(self, a => a.slug())
    }

    fn plan(&self) -> FetchPlan {
        dispatch!(self, a => a.plan())
    }

    fn expected_page_size(&self) -> usize {
        dispatch!(self, a => a.expected_page_size())
    }

    fn build_url(&self, cursor: &IngestionCursor) -> Option<String> {
        dispatch!(self, a => a.build_url(cursor))
    }

    fn build_headers(&self) -> Option<Headers> {
        dispatch!(self, a => a.build_headers())
    }

    fn build_body(&self, cursor: &IngestionCursor) -> Option<Vec<u8>> {
        dispatch!(self, a => a.build_body(cursor))
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        dispatch!(self, a => a.normalize(payload))
    }

    fn missing_config(&self) -> String {
        dispatch!(self, a => a.missing_config())
    }

    fn build_request(&self, cursor: &IngestionCursor) -> Option<FetchRequest> {
        dispatch!(self, a => a.build_request(cursor))
    }

    fn feed_requests(&self) -> Option<Vec<FetchRequest>> {
        dispatch!(self, a => a.feed_requests())
    }

    fn company_request(&self, target: &CompanyTarget) -> Option<FetchRequest> {
        dispatch!(self, a => a.company_request(target))
    }
}

/// Factory that creates the adapter for a registry entry's `adapter` kind.
///
/// Credentials are resolved once, when the adapter is created, so a missing
/// key shows up as a skip on that run only.
#[derive(Debug, Clone, Default)]
pub struct AdapterFactoryEnum<C = EnvCredentials> {
    credentials: C,
}

impl AdapterFactoryEnum<EnvCredentials> {
    /// Factory reading credentials from environment variables.
    pub fn new() -> Self {
        Self {
            credentials: EnvCredentials,
        }
    }
}

impl<C: CredentialProvider> AdapterFactoryEnum<C> {
    pub fn with_credentials(credentials: C) -> Self {
        Self { credentials }
    }
}

impl<C: CredentialProvider> AdapterFactory for AdapterFactoryEnum<C> {
    type Adapter = SourceAdapterEnum;

    fn create(&self, entry: &SourceEntry) -> Result<Self::Adapter, AppError> {
        let creds = &self.credentials;
        let adapter = match entry.adapter {
            AdapterKind::Adzuna => SourceAdapterEnum::Adzuna(AdzunaAdapter::new(entry, creds)),
            AdapterKind::Jooble => SourceAdapterEnum::Jooble(JoobleAdapter::new(entry, creds)),
            AdapterKind::UsaJobs => SourceAdapterEnum::UsaJobs(UsaJobsAdapter::new(entry, creds)),
            AdapterKind::Reed => SourceAdapterEnum::Reed(ReedAdapter::new(entry, creds)),
            AdapterKind::TheMuse => SourceAdapterEnum::TheMuse(TheMuseAdapter::new(entry, creds)),
            AdapterKind::TheirStack => {
                SourceAdapterEnum::TheirStack(TheirStackAdapter::new(entry, creds))
            }
            AdapterKind::Rss => SourceAdapterEnum::Rss(RssAdapter::new(entry)),
            AdapterKind::Greenhouse => {
                SourceAdapterEnum::Greenhouse(GreenhouseAdapter::new(entry))
            }
            AdapterKind::Lever => SourceAdapterEnum::Lever(LeverAdapter::new(entry)),
        };
        if let Some(url) = &entry.base_url
            && reqwest::Url::parse(url).is_err()
        {
            return Err(AppError::ConfigError(format!(
                "source '{}' has an invalid base_url: {}",
                entry.slug, url
            )));
        }
        Ok(adapter)
    }
}
