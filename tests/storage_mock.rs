use std::io::Write;
use std::sync::{Arc, Mutex};

use seer_pas_sdk::storage::{MockObjectStore, ObjectStore};

#[tokio::test]
async fn mocked_store_records_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plateMap_test.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "MS file name,Sample name").unwrap();

    let uploads: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&uploads);

    let mut store = MockObjectStore::new();
    store
        .expect_put_file()
        .times(1)
        .returning(move |bucket, key, _| {
            recorded
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(())
        });

    store
        .put_file("tenant-bucket", "tenant/plate/plateMap_test.csv", &path)
        .await
        .unwrap();

    let uploads = uploads.lock().unwrap();
    assert_eq!(
        uploads.as_slice(),
        &[(
            "tenant-bucket".to_string(),
            "tenant/plate/plateMap_test.csv".to_string()
        )]
    );
}
