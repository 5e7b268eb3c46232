#[cfg(test)]
mod tests {
    use crate::{
        pg_client, reset_table,
        utils::{READINGS_TABLE_DDL, pair_mapping, pairs, reading_mapping, readings},
    };
    use chrono::{DateTime, Utc};
    use engine_config::settings::CopySettings;
    use engine_core::bulk::BulkInsert;
    use std::sync::Arc;
    use tracing_test::traced_test;

    const READINGS_TABLE: &str = "bulk_copy_readings";

    // Requires a running Postgres at TEST_PG_URL.
    // Expected Outcome: the server accepts the stream and every value reads back.
    #[ignore]
    #[traced_test]
    #[tokio::test]
    async fn readings_round_trip() {
        let client = pg_client().await;
        reset_table(&client, READINGS_TABLE, READINGS_TABLE_DDL).await;

        let input = readings(1_000);
        let rows = BulkInsert::new(reading_mapping(READINGS_TABLE))
            .with_settings(CopySettings::new(4096).unwrap())
            .save_all(client.as_ref(), &input)
            .await
            .expect("bulk insert");
        assert_eq!(rows, 1_000);

        let fetched = client
            .query(
                &format!(
                    "SELECT id, sensor, location[0], location[1], taken_at, note, tags, attrs \
                     FROM {READINGS_TABLE} ORDER BY id"
                ),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(fetched.len(), input.len());

        for (row, reading) in fetched.iter().zip(&input) {
            assert_eq!(row.get::<_, i64>(0), reading.id);
            assert_eq!(row.get::<_, String>(1), reading.sensor);
            assert_eq!(row.get::<_, f64>(2), reading.location.x);
            assert_eq!(row.get::<_, f64>(3), reading.location.y);
            assert_eq!(row.get::<_, DateTime<Utc>>(4), reading.taken_at);
            assert_eq!(row.get::<_, Option<String>>(5), reading.note);
            assert_eq!(row.get::<_, Vec<String>>(6), reading.tags);
            assert_eq!(row.get::<_, serde_json::Value>(7), reading.attrs);
        }
    }

    // Scenario: concurrent producers on a shared session against a real server.
    #[ignore]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_session_is_accepted() {
        let client = pg_client().await;
        reset_table(&client, "pairs", "id INT PRIMARY KEY, name TEXT NOT NULL").await;

        let session = BulkInsert::new(pair_mapping())
            .session(&client)
            .await
            .expect("open session");
        let input = Arc::new(pairs(500));

        let mut handles = Vec::new();
        for worker in 0..4 {
            let session = session.clone();
            let input = Arc::clone(&input);
            handles.push(tokio::spawn(async move {
                for pair in input.iter().skip(worker).step_by(4) {
                    session.save(pair).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(session.finish().await.unwrap(), 500);

        let count: i64 = client
            .query_one("SELECT COUNT(*) FROM pairs", &[])
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 500);
    }

    // Scenario: an entity fails inside a transaction.
    // Expected Outcome: rolling back leaves the table empty.
    #[ignore]
    #[tokio::test]
    async fn failed_load_rolls_back_in_transaction() {
        let (mut client, connection) =
            tokio_postgres::connect(&crate::test_pg_url(), tokio_postgres::NoTls)
                .await
                .expect("connect postgres");
        tokio::spawn(connection);
        reset_table(&client, "pairs", "id INT PRIMARY KEY, name TEXT NOT NULL").await;

        let mut input = pairs(10);
        input[7].name = "nul\0byte".into();

        let tx = client.transaction().await.unwrap();
        let result = BulkInsert::new(pair_mapping()).save_all(&tx, &input).await;
        assert!(result.is_err());
        tx.rollback().await.unwrap();

        let count: i64 = client
            .query_one("SELECT COUNT(*) FROM pairs", &[])
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 0);
    }
}
