//! Integration tests for store creation and slugs.
//!
//! These tests require a `PostgreSQL` database at `TEST_DATABASE_URL`.

#![allow(clippy::unwrap_used)]

use suuq_integration_tests::{TestContext, unique};
use suuq_server::db::StoreRepository;

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_duplicate_names_get_numbered_slugs() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let name = format!("Acme {}", unique());
    let base = suuq_core::slugify(&name);

    let first = ctx.create_store(&owner, &name).await;
    let second = ctx.create_store(&owner, &name).await;
    let third = ctx.create_store(&owner, &name).await;

    assert_eq!(first.slug, base);
    assert_eq!(second.slug, format!("{base}-1"));
    assert_eq!(third.slug, format!("{base}-2"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_longest_name_still_gets_numbered_slug() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let name = format!("{}{}", unique(), "x".repeat(88));
    assert_eq!(name.chars().count(), 100);

    let first = ctx.create_store(&owner, &name).await;
    let second = ctx.create_store(&owner, &name).await;

    assert_eq!(second.slug, format!("{}-1", first.slug));
    assert!(second.slug.chars().count() <= suuq_core::MAX_SLUG_LEN);
    assert_eq!(second.name, name);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_inactive_store_is_hidden_from_storefront() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Shade {}", unique())).await;
    let stores = StoreRepository::new(&ctx.pool);

    assert!(stores.get_active_by_slug(&store.slug).await.unwrap().is_some());

    let toggled = stores.toggle_active(store.id).await.unwrap();
    assert!(!toggled.is_active);
    assert!(stores.get_active_by_slug(&store.slug).await.unwrap().is_none());
    assert!(stores.get_by_id(store.id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_owner_scoping() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let stranger = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Mine {}", unique())).await;
    let stores = StoreRepository::new(&ctx.pool);

    assert!(stores.get_owned(store.id, owner.id).await.unwrap().is_some());
    assert!(stores.get_owned(store.id, stranger.id).await.unwrap().is_none());

    let listed = stores.list_by_owner(owner.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(stores.list_by_owner(stranger.id).await.unwrap().is_empty());
}
