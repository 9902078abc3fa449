use chrono::{NaiveDate, NaiveDateTime};
use threatgraph_analysis::{ActivityReport, AnalysisError, ClassifierConfig, MetricColumn, MetricsReport};
use threatgraph_core::{PulseRecord, RelatedEntityRecord, ThreatGroupRecord};
use threatgraph_store::{GraphStore, MemoryGraphStore};

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

async fn seed(store: &mut dyn GraphStore, name: &str, aliases: usize, techniques: usize, pulses: &[&str]) {
    let alias_names = (0..aliases).map(|i| format!("{} alias {}", name, i)).collect();
    store
        .merge_threat_group(&ThreatGroupRecord::new(name, "group", alias_names))
        .await
        .unwrap();

    store.merge_tactic(name, "execution").await.unwrap();
    for i in 0..techniques {
        store
            .merge_technique(name, "execution", &format!("T{}", 1000 + i))
            .await
            .unwrap();
    }

    for (i, created) in pulses.iter().enumerate() {
        let pulse = PulseRecord::from_json(&serde_json::json!({
            "id": format!("{}-{}", name, i),
            "name": format!("{} pulse {}", name, i),
            "created": created,
        }));
        store.merge_pulse(name, &pulse).await.unwrap();
    }

    for category in ["malware", "tool"] {
        let entity = RelatedEntityRecord::from_json(&serde_json::json!({
            "tid": format!("{}-{}", name, category),
            "name": format!("{} {}", name, category),
            "category": category,
            "risk": "high",
        }));
        store.merge_related_entity(name, &entity).await.unwrap();
    }
}

#[tokio::test]
async fn test_reports_from_memory_store() {
    let mut store = MemoryGraphStore::new();
    seed(&mut store, "APT28", 3, 12, &["2024-06-01T00:00:00", "2024-11-02T00:00:00"]).await;
    seed(&mut store, "APT29", 2, 8, &["2016-02-01T00:00:00"]).await;
    seed(&mut store, "Lazarus", 5, 20, &["2019-01-01T00:00:00", "2024-12-01T00:00:00"]).await;
    seed(&mut store, "Turla", 1, 4, &["2021-03-03T00:00:00.250"]).await;
    seed(&mut store, "Silent", 0, 2, &[]).await;

    let rows = store.threat_group_metrics(now()).await.unwrap();
    assert_eq!(rows.len(), 5);

    let metrics = MetricsReport::build(&rows).unwrap();
    let ttp = metrics
        .columns
        .iter()
        .find(|c| c.column == MetricColumn::TtpCount)
        .unwrap();
    assert_eq!(ttp.count, 5);
    // one group has no pulse, so its age is missing
    let ages = metrics
        .columns
        .iter()
        .find(|c| c.column == MetricColumn::PulseAgeDays)
        .unwrap();
    assert_eq!(ages.count, 4);

    let observations = store.pulse_timeline().await.unwrap();
    let activity = ActivityReport::build(&observations, now(), &ClassifierConfig::default()).unwrap();
    assert_eq!(activity.pulses, 6);
    assert_eq!(activity.classification.inactive, vec!["APT29"]);
    assert_eq!(activity.classification.emerging, vec!["APT28"]);

    let json = serde_json::to_value(&activity).unwrap();
    assert_eq!(json["classification"]["emerging"][0], "APT28");
}

#[tokio::test]
async fn test_empty_store_reports_no_data() {
    let store = MemoryGraphStore::new();

    let rows = store.threat_group_metrics(now()).await.unwrap();
    assert_eq!(
        MetricsReport::build(&rows).unwrap_err().to_string(),
        "No threat group data found"
    );

    let observations = store.pulse_timeline().await.unwrap();
    assert_eq!(
        ActivityReport::build(&observations, now(), &ClassifierConfig::default()).unwrap_err(),
        AnalysisError::EmptyProjection("pulse")
    );
}
