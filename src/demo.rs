//! The batch usage walkthrough: create tables, load them, read a batch back,
//! archive part of one table, optionally drop everything.

use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::agent::{BatchAgent, MAX_GET_SIZE};
use crate::config::DemoConfig;
use crate::convert::item_to_json;
use crate::dataset::Dataset;
use crate::error::{BatchError, Result};
use crate::model::{Item, TableSpec};
use crate::store::BatchStore;
use crate::timeseries;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoReport {
    pub tables: Vec<TableSpec>,
    pub loaded: BTreeMap<String, usize>,
    pub retrieved: BTreeMap<String, usize>,
    pub archive: Option<TableSpec>,
    pub time_series: Option<TableSpec>,
}

pub async fn run<S: BatchStore>(
    agent: &BatchAgent<S>,
    dataset: &Dataset,
    config: &DemoConfig,
) -> Result<DemoReport> {
    let collections: Vec<String> = if config.collections.is_empty() {
        dataset.collection_names().map(str::to_string).collect()
    } else {
        config.collections.clone()
    };
    if collections.is_empty() {
        return Err(BatchError::Validation("data file has no collections".into()));
    }

    let mut report = DemoReport::default();

    println!("Creating {} tables and waiting until they exist...", collections.len());
    let mut loaded: Vec<(TableSpec, Vec<Item>)> = Vec::with_capacity(collections.len());
    for collection in &collections {
        let items = dataset.items(collection, config.max_items)?;
        let spec = TableSpec::new(
            format!("{}-{}-{}", config.table_prefix, collection, unique_suffix()),
            config.key_schema.clone(),
        )
        .with_throughput(config.throughput);
        agent.create_table(&spec).await?;
        println!("Created {}.", spec.name);
        report.tables.push(spec.clone());
        loaded.push((spec, items));
    }

    let start = Instant::now();
    for (spec, items) in &loaded {
        println!("Putting {} items into {}.", items.len(), spec.name);
        agent.fill_table(spec, items.clone()).await?;
        report.loaded.insert(spec.name.clone(), items.len());
    }
    println!("Loaded every table in {:.3?}", start.elapsed());

    let per_table = MAX_GET_SIZE / loaded.len();
    let requests: Vec<(&TableSpec, Vec<Item>)> = loaded
        .iter()
        .map(|(spec, items)| (spec, distinct_keys(spec, items, per_table)))
        .collect();
    let retrieved = agent.get_batch_data(&requests).await?;
    for (spec, _) in &loaded {
        let items = retrieved.get(&spec.name).map(Vec::as_slice).unwrap_or_default();
        println!("Got {} items from {}.", items.len(), spec.name);
        for item in items.iter().take(2) {
            let json = item_to_json(item)?;
            let pretty = serde_json::to_string_pretty(&json)
                .map_err(|e| BatchError::Serialization(e.to_string()))?;
            println!("{pretty}");
        }
        report.retrieved.insert(spec.name.clone(), items.len());
    }

    if let Some((source, items)) = loaded.first() {
        let take = config.archive_count.min(items.len());
        if take > 0 {
            println!(
                "Archiving the first {take} items of {} by creating an archive table and deleting them from the source.",
                source.name
            );
            // Doubled so the plain writer trips over duplicate keys.
            let doubled: Vec<Item> = items[..take].iter().chain(&items[..take]).cloned().collect();
            let archive = agent.archive(source, &doubled).await?;
            println!("Items successfully archived to {}.", archive.name);
            report.archive = Some(archive);
        }
    }

    if config.time_series_records > 0 {
        let spec = timeseries::table_spec(
            format!("{}-TimeSeries-{}", config.table_prefix, unique_suffix()),
            config.throughput,
        );
        timeseries::run(agent, &spec, config.time_series_records).await?;
        report.time_series = Some(spec);
    }

    if config.cleanup {
        let extra = report.archive.iter().chain(&report.time_series);
        let mut deleted = 0;
        for spec in extra.chain(&report.tables) {
            agent.delete_table(spec).await?;
            deleted += 1;
        }
        println!("Deleted {deleted} tables.");
    }

    info!(tables = report.tables.len(), "demo finished");
    Ok(report)
}

/// Up to `limit` distinct primary keys from `items`. A batch get may not
/// ask for the same key twice.
fn distinct_keys(spec: &TableSpec, items: &[Item], limit: usize) -> Vec<Item> {
    let mut keys: Vec<Item> = Vec::with_capacity(limit.min(items.len()));
    for key in items.iter().filter_map(|item| spec.key_of(item)) {
        if keys.len() == limit {
            break;
        }
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyAttribute, ScalarType};
    use crate::testing::{item, MockStore};

    const DATA: &str = r#"{
        "trades": [
            {"id": "t1", "notional": 100},
            {"id": "t2", "notional": 200},
            {"id": "t3", "notional": 300}
        ],
        "vegas": [
            {"id": "v1", "float_value": 0.5},
            {"id": "v2", "float_value": 0.7}
        ]
    }"#;

    fn config() -> DemoConfig {
        DemoConfig {
            key_schema: vec![KeyAttribute::hash("id", ScalarType::S)],
            archive_count: 2,
            ..DemoConfig::default()
        }
    }

    #[tokio::test]
    async fn walks_through_every_step() {
        let agent = BatchAgent::new(MockStore::default());
        let dataset = Dataset::from_json_str(DATA).unwrap();

        let report = run(&agent, &dataset, &config()).await.unwrap();

        assert_eq!(report.tables.len(), 2);
        let trades = &report.tables[0];
        assert!(trades.name.starts_with("demo-batch-trades-"));
        assert_eq!(report.loaded[&trades.name], 3);
        assert_eq!(report.retrieved[&trades.name], 3);
        assert_eq!(report.retrieved[&report.tables[1].name], 2);

        let archive = report.archive.unwrap();
        assert_eq!(archive.name, format!("{}-archive", trades.name));
        assert_eq!(agent.store.items(&archive.name).len(), 2);
        assert_eq!(agent.store.items(&trades.name).len(), 1);
    }

    #[tokio::test]
    async fn cleanup_deletes_every_table() {
        let agent = BatchAgent::new(MockStore::default());
        let dataset = Dataset::from_json_str(DATA).unwrap();
        let config = DemoConfig {
            cleanup: true,
            ..config()
        };

        run(&agent, &dataset, &config).await.unwrap();

        assert!(agent.store.table_names().is_empty());
        assert_eq!(agent.store.deleted_tables().len(), 3);
    }

    #[tokio::test]
    async fn time_series_step_creates_an_indexed_table() {
        let agent = BatchAgent::new(MockStore::default());
        let dataset = Dataset::from_json_str(DATA).unwrap();
        let config = DemoConfig {
            time_series_records: 4,
            cleanup: true,
            ..config()
        };

        let report = run(&agent, &dataset, &config).await.unwrap();

        let series = report.time_series.unwrap();
        assert!(series.name.starts_with("demo-batch-TimeSeries-"));
        assert_eq!(series.local_indexes.len(), 1);
        assert_eq!(agent.store.put_calls().len(), 4);
        assert!(agent.store.table_names().is_empty());
        assert_eq!(agent.store.deleted_tables().len(), 4);
    }

    #[tokio::test]
    async fn only_selected_collections_are_loaded() {
        let agent = BatchAgent::new(MockStore::default());
        let dataset = Dataset::from_json_str(DATA).unwrap();
        let config = DemoConfig {
            collections: vec!["vegas".into()],
            archive_count: 0,
            ..config()
        };

        let report = run(&agent, &dataset, &config).await.unwrap();

        assert_eq!(report.tables.len(), 1);
        assert!(report.archive.is_none());
        assert_eq!(agent.store.table_names().len(), 1);
    }

    #[tokio::test]
    async fn empty_dataset_is_rejected() {
        let agent = BatchAgent::new(MockStore::default());
        let err = run(&agent, &Dataset::default(), &config()).await.unwrap_err();
        assert!(matches!(err, BatchError::Validation(_)));
    }

    #[test]
    fn distinct_keys_skips_repeats_and_stops_at_the_limit() {
        let spec = TableSpec::new("t", vec![KeyAttribute::hash("id", ScalarType::S)]);
        let items = vec![
            item(&[("id", "a"), ("v", "1")]),
            item(&[("id", "a"), ("v", "2")]),
            item(&[("id", "b")]),
            item(&[("id", "c")]),
        ];
        let keys = distinct_keys(&spec, &items, 2);
        assert_eq!(keys, vec![item(&[("id", "a")]), item(&[("id", "b")])]);
    }
}
