use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{AnalysisError, PriceTable};

/// Trait for historical price providers.
///
/// Implementations return a validated, aligned `PriceTable` or fail with
/// `AnalysisError::NoDataAvailable`. Retries and backoff are the provider's
/// concern; callers do not retry.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, AnalysisError>;
}
