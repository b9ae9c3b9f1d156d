use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use orchestra_core::{ErrorKind, MockClock};
use orchestra_domain::{MachineService, MachineUpdate};
use orchestra_infrastructure::MemoryStore;

fn service() -> (MachineService, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(
        NaiveDate::from_ymd_opt(2024, 5, 16)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap(),
    ));
    let service = MachineService::new(Arc::new(MemoryStore::new()), clock.clone());
    (service, clock)
}

#[tokio::test]
async fn test_create_machine_rejects_live_ip() {
    let (service, _) = service();

    let machine = service.create("10.0.0.1").await.unwrap();
    assert!(machine.id > 0);
    assert_eq!(machine.hostname, "");
    assert_eq!(machine.cpu_load, 0);

    let err = service.create("10.0.0.1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    service.remove(machine.id).await.unwrap();
    assert!(service.find_by_id(machine.id).await.unwrap().is_none());
    let again = service.create("10.0.0.1").await.unwrap();
    assert_ne!(again.id, machine.id);
}

#[tokio::test]
async fn test_update_machine() {
    let (service, clock) = service();
    let first = service.create("10.0.0.1").await.unwrap();
    let second = service.create("10.0.0.2").await.unwrap();

    clock.advance(Duration::seconds(30));
    let updated = service
        .update(
            first.id,
            MachineUpdate {
                hostname: Some("worker-a".to_string()),
                cpu_load: Some(42),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.hostname, "worker-a");
    assert_eq!(updated.cpu_load, 42);
    assert_eq!(updated.ip, "10.0.0.1");
    assert!(updated.update_time > first.update_time);

    let found = service.find_by_hostname("worker-a").await.unwrap().unwrap();
    assert_eq!(found.id, first.id);

    // 保持自己的 ip 不算冲突
    service
        .update(
            first.id,
            MachineUpdate {
                ip: Some("10.0.0.1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service
        .update(
            second.id,
            MachineUpdate {
                ip: Some("10.0.0.1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    let err = service
        .update(99, MachineUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_listing_and_remove() {
    let (service, _) = service();
    for i in 1..=5 {
        let machine = service.create(&format!("10.0.0.{i}")).await.unwrap();
        service
            .update(
                machine.id,
                MachineUpdate {
                    hostname: Some(if i % 2 == 0 { format!("gpu-{i}") } else { format!("cpu-{i}") }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let (page, total) = service.listing(2, 2, None).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].ip, "10.0.0.3");

    let (gpus, total) = service.listing(1, 10, Some("gpu")).await.unwrap();
    assert_eq!(total, 2);
    assert!(gpus.iter().all(|m| m.hostname.starts_with("gpu")));

    let first = service.find_by_ip("10.0.0.1").await.unwrap().unwrap();
    service.remove(first.id).await.unwrap();
    let err = service.remove(first.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let (_, total) = service.listing(1, 10, None).await.unwrap();
    assert_eq!(total, 4);
}
