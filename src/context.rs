use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::churn::{ChurnModelPackage, ChurnScorer};
use crate::error::Result;
use crate::sales::SalesForecaster;
use crate::sarima::SeasonalArima;

/// Process-wide, read-only models shared by every request.
#[derive(Debug, Clone)]
pub struct AnalyticsContext {
    churn: Arc<ChurnModelPackage>,
    sales: SalesForecaster,
}

impl AnalyticsContext {
    pub fn new(churn: ChurnModelPackage, sales: SalesForecaster) -> Self {
        Self {
            churn: Arc::new(churn),
            sales,
        }
    }

    /// Load both artifacts. The churn package is mandatory; a missing sales
    /// artifact leaves forecasting unavailable instead of failing startup.
    pub fn load(churn_path: &Path, sales_path: &Path) -> Result<Self> {
        let churn = ChurnModelPackage::load(churn_path)?;

        let sales = if sales_path.exists() {
            SalesForecaster::new(SeasonalArima::load(sales_path)?)
        } else {
            warn!(
                path = %sales_path.display(),
                "sales forecaster artifact missing, forecasting disabled"
            );
            SalesForecaster::unavailable()
        };

        Ok(Self::new(churn, sales))
    }

    pub fn scorer(&self) -> ChurnScorer {
        ChurnScorer::new(Arc::clone(&self.churn))
    }

    pub fn sales(&self) -> &SalesForecaster {
        &self.sales
    }
}
