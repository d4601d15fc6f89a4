use std::sync::Arc;

use integration_tests::stores;
use mc_auth_simple::{Session, SimpleAuthProvider};
use mc_core::{AppError, FeedbackStatus, IdentityProvider, ProfileUpdate, Role};

fn provider() -> Arc<SimpleAuthProvider> {
    Arc::new(SimpleAuthProvider::new())
}

#[tokio::test]
async fn display_name_is_a_snapshot_taken_at_submission() {
    for (backend, store) in stores().await {
        let session = Session::new(provider());
        let me = session
            .register("Demo User", "user@example.com", "password123")
            .await
            .unwrap();

        let before = store
            .submit_as(session.current_identity().as_ref(), "img-1", "Looks like a chanterelle")
            .await
            .unwrap();
        assert_eq!(before.author_display_name, "Demo User", "{backend}");

        session
            .update_profile(ProfileUpdate {
                name: "Mushroom Fan".into(),
                email: "user@example.com".into(),
                bio: Some("weekend forager".into()),
            })
            .await
            .unwrap();
        assert_eq!(
            session.current_identity().unwrap().display_name,
            "Mushroom Fan",
            "{backend}"
        );

        let after = store
            .submit_as(session.current_identity().as_ref(), "img-2", "And this one?")
            .await
            .unwrap();

        let mine = store.query_by_author(&me.id).await.unwrap();
        let names: Vec<_> = mine
            .iter()
            .map(|r| r.author_display_name.as_str())
            .collect();
        assert_eq!(names, ["Demo User", "Mushroom Fan"], "{backend}");
        assert_eq!(mine[1].id, after.id, "{backend}");
    }
}

#[tokio::test]
async fn logged_out_session_cannot_submit() {
    let (_, store) = stores().await.remove(0);
    let session = Session::new(provider());
    session
        .register("Demo User", "user@example.com", "password123")
        .await
        .unwrap();
    session.logout();

    let err = store
        .submit_as(session.current_identity().as_ref(), "img-1", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthenticationRequired));
}

#[tokio::test]
async fn seeded_admin_moderates_through_a_session() {
    let auth = provider();
    auth.seed_admin("Admin User", "admin@mushroom.com", "admin123")
        .await
        .unwrap();

    let (_, store) = stores().await.remove(1);
    let user_session = Session::new(auth.clone());
    user_session
        .register("Demo User", "user@example.com", "password123")
        .await
        .unwrap();
    let record = store
        .submit_as(user_session.current_identity().as_ref(), "img-1", "Please check")
        .await
        .unwrap();

    let user = user_session.current_identity().unwrap();
    assert!(matches!(
        store.moderate(&user, record.id, FeedbackStatus::Approved).await,
        Err(AppError::Forbidden(_))
    ));

    let admin_session = Session::new(auth);
    let admin = admin_session
        .login("admin@mushroom.com", "admin123")
        .await
        .unwrap();
    assert_eq!(admin.role, Role::Admin);

    store
        .moderate(&admin, record.id, FeedbackStatus::Approved)
        .await
        .unwrap();
    assert_eq!(store.visible_to(&admin).await.unwrap().len(), 1);
    assert_eq!(store.query_public().await.unwrap()[0].id, record.id);
}

#[tokio::test]
async fn wrong_password_leaves_session_signed_out() {
    let auth = provider();
    Session::new(auth.clone())
        .register("Demo User", "user@example.com", "password123")
        .await
        .unwrap();

    let session = Session::new(auth);
    assert!(matches!(
        session.login("user@example.com", "nope").await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(session.current_identity().is_none());
}
