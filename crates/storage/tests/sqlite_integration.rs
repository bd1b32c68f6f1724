use storage::repository::PreferenceRepository;
use storage::sqlite::SqliteRepository;
use study_core::model::PreferenceKey;

#[tokio::test]
async fn sqlite_persists_and_overwrites_preferences() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_prefs?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert!(
        repo.get_preference(PreferenceKey::TourDismissed)
            .await
            .unwrap()
            .is_none()
    );

    repo.set_preference(PreferenceKey::TourDismissed, "true")
        .await
        .unwrap();
    repo.set_preference(PreferenceKey::QuizIntroSeen, "false")
        .await
        .unwrap();
    repo.set_preference(PreferenceKey::QuizIntroSeen, "true")
        .await
        .unwrap();

    assert_eq!(
        repo.get_preference(PreferenceKey::QuizIntroSeen)
            .await
            .unwrap()
            .as_deref(),
        Some("true")
    );

    let all = repo.list_preferences().await.unwrap();
    assert_eq!(
        all,
        vec![
            (PreferenceKey::QuizIntroSeen, "true".to_string()),
            (PreferenceKey::TourDismissed, "true".to_string()),
        ]
    );
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");

    repo.set_preference(PreferenceKey::CompletionCelebrationSeen, "true")
        .await
        .unwrap();
    assert_eq!(repo.list_preferences().await.unwrap().len(), 1);
}

#[tokio::test]
async fn storage_sqlite_wires_preferences() {
    let storage = storage::Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage
        .preferences
        .set_preference(PreferenceKey::TourDismissed, "true")
        .await
        .unwrap();
    assert!(
        storage
            .preferences
            .get_preference(PreferenceKey::TourDismissed)
            .await
            .unwrap()
            .is_some()
    );
}
