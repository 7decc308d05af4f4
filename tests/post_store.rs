use maata::models::MediaUpload;
use maata::user_models::SignupRequest;
use maata::{Limits, PostStore, StoreError, UserStorage};

#[tokio::test]
async fn community_walkthrough() {
    let dir = tempfile::tempdir().unwrap();
    let users = UserStorage::open(dir.path().join("users.csv"), 4).unwrap();
    let store = PostStore::open(dir.path(), Limits::default()).unwrap();

    users
        .signup(SignupRequest {
            username: "asha".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
            email: None,
        })
        .await
        .unwrap();
    let asha = users.authenticate("asha", "secret1").await.unwrap();

    store.create_post("ravi", "older post", None).await.unwrap();
    let post_id = store.create_post(&asha.username, "hello", None).await.unwrap();
    assert_eq!(store.list_posts().await.unwrap()[0].post_id, post_id);

    assert_eq!(store.toggle_like(&post_id, "ravi").await.unwrap(), (1, true));
    assert_eq!(store.toggle_like(&post_id, "ravi").await.unwrap(), (0, false));

    store.delete_post(&post_id, "asha").await.unwrap();
    let remaining = store.list_posts().await.unwrap();
    assert!(remaining.iter().all(|p| p.post_id != post_id));
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn posts_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();

    let (with_media, text_only) = {
        let store = PostStore::open(dir.path(), Limits::default()).unwrap();
        let with_media = store
            .create_post(
                "asha",
                "Bathukamma, \"finally\"\nsecond line",
                Some(MediaUpload::new("festival.MP4", vec![7; 64])),
            )
            .await
            .unwrap();
        let text_only = store.create_post("ravi", "just words", None).await.unwrap();
        (
            store.get_post(&with_media).await.unwrap(),
            store.get_post(&text_only).await.unwrap(),
        )
    };

    let reopened = PostStore::open(dir.path(), Limits::default()).unwrap();
    for original in [&with_media, &text_only] {
        let loaded = reopened.get_post(&original.post_id).await.unwrap();
        assert_eq!(&loaded, original);
    }

    let media_name = with_media.media_path.as_deref().unwrap();
    assert_eq!(media_name, format!("{}.mp4", with_media.post_id));
    assert!(reopened.media().path_of(media_name).exists());
    assert_eq!(text_only.media_path, None);
}

#[tokio::test]
async fn limits_come_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let limits = Limits {
        max_caption_chars: 10,
        max_comment_chars: 5,
        max_upload_bytes: 8,
    };
    let store = PostStore::open(dir.path(), limits).unwrap();

    assert!(matches!(
        store.create_post("asha", "eleven char", None).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        store
            .create_post("asha", "", Some(MediaUpload::new("a.gif", vec![0; 9])))
            .await,
        Err(StoreError::Validation(_))
    ));

    let id = store.create_post("asha", "short", None).await.unwrap();
    assert!(matches!(
        store.add_comment(&id, "ravi", "too long").await,
        Err(StoreError::Validation(_))
    ));
    assert!(store.add_comment(&id, "ravi", "ok!").await.is_ok());
}
