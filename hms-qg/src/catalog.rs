//! Static source catalog
//!
//! Local deployments without live source connections can register fixed
//! record sets from a JSON file:
//!
//! ```json
//! [{"source": "supabase", "collection": "products",
//!   "records": [{"id": "42", "data": {"sku": "A-42", "price": 10}}]}]
//! ```

use hms_common::sources::{SourceClient, StaticSourceClient};
use hms_common::{Error, Result, SourceIdentity};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CatalogSource {
    pub source: SourceIdentity,
    pub collection: String,
    #[serde(default)]
    pub records: Vec<CatalogRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub data: Value,
}

pub fn parse_catalog(content: &str) -> Result<Vec<Arc<dyn SourceClient>>> {
    let sources: Vec<CatalogSource> = serde_json::from_str(content)?;

    let mut seen = Vec::new();
    for source in &sources {
        if seen.contains(&source.source) {
            return Err(Error::Config(format!("source '{}' listed twice in catalog", source.source)));
        }
        seen.push(source.source.clone());
    }

    Ok(sources
        .into_iter()
        .map(|source| {
            tracing::info!(
                origin = %source.source,
                collection = %source.collection,
                records = source.records.len(),
                "Registered static source"
            );
            let rows = source.records.into_iter().map(|r| (r.id, r.data)).collect();
            Arc::new(StaticSourceClient::new(source.source, source.collection, rows)) as Arc<dyn SourceClient>
        })
        .collect())
}

pub fn load_catalog(path: &Path) -> Result<Vec<Arc<dyn SourceClient>>> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog(&content)
}
