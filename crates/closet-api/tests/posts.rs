mod common;

use axum::http::{Method, StatusCode};
use closet_api::middleware::IdentityMode;
use serde_json::json;

use common::{TestApp, id_of};

#[tokio::test]
async fn only_the_owner_can_edit_a_post() {
    let app = TestApp::new(IdentityMode::Bearer).await;
    let u1 = app.signup("seller").await;
    let u2 = app.signup("stranger").await;

    let post = app.create_post(&u1, "Winter coat").await;
    let uri = format!("/posts/{}", id_of(&post));

    let (status, body) = app
        .call(Method::PUT, &uri, Some(&u2), Some(json!({ "title": "Mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You can edit only your own post");

    let (status, body) = app
        .call(Method::PUT, &uri, Some(&u1), Some(json!({ "title": "Winter coat, size M" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Winter coat, size M");

    let (_, fetched) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(fetched["title"], "Winter coat, size M");
    assert_eq!(fetched["content"], "barely worn");
    assert_eq!(fetched["author"]["nickname"], "seller");
}

#[tokio::test]
async fn blank_fields_are_ignored_on_patch() {
    let app = TestApp::new(IdentityMode::Header).await;
    let owner = app.signup("owner").await;
    let post = app.create_post(&owner, "Desk lamp").await;
    let uri = format!("/posts/{}", id_of(&post));

    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some(&owner),
            Some(json!({ "title": "  ", "content": "", "imageUrl": "http://img/lamp.png" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Desk lamp");
    assert_eq!(body["content"], "barely worn");
    assert_eq!(body["imageUrl"], "http://img/lamp.png");
}

#[tokio::test]
async fn create_requires_title_and_content() {
    let app = TestApp::new(IdentityMode::Header).await;
    let owner = app.signup("writer").await;

    let (status, body) = app
        .call(Method::POST, "/posts", Some(&owner), Some(json!({ "content": "no title" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "title is required");
}

#[tokio::test]
async fn deleting_a_post_removes_its_comments() {
    let app = TestApp::new(IdentityMode::Header).await;
    let owner = app.signup("host").await;
    let guest = app.signup("guest").await;

    let post = app.create_post(&owner, "Bike").await;
    let post_id = id_of(&post);
    let comments_uri = format!("/posts/{}/comments", post_id);

    for text in ["still available?", "can you do 50?"] {
        let (status, _) = app
            .call(Method::POST, &comments_uri, Some(&guest), Some(json!({ "content": text })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, comments) = app.call(Method::GET, &comments_uri, None, None).await;
    assert_eq!(comments.as_array().unwrap().len(), 2);
    assert_eq!(comments[0]["content"], "still available?");
    assert_eq!(comments[0]["authorNickname"], "guest");

    let (status, _) = app
        .call(Method::DELETE, &format!("/posts/{}", post_id), Some(&guest), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::DELETE, &format!("/posts/{}", post_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, &comments_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .call(Method::GET, &format!("/posts/{}", post_id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_can_delete_a_comment() {
    let app = TestApp::new(IdentityMode::Header).await;
    let owner = app.signup("lister").await;
    let guest = app.signup("buyer").await;
    let post = app.create_post(&owner, "Monitor").await;

    let (_, comment) = app
        .call(
            Method::POST,
            &format!("/posts/{}/comments", id_of(&post)),
            Some(&guest),
            Some(json!({ "content": "price?" })),
        )
        .await;
    let uri = format!("/posts/comments/{}", id_of(&comment));

    let (status, body) = app.call(Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You can delete only your own comment");

    let (status, _) = app.call(Method::DELETE, &uri, Some(&guest), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn listing_is_newest_first_and_pageable() {
    let app = TestApp::new(IdentityMode::Header).await;
    let owner = app.signup("prolific").await;
    for title in ["first", "second", "third"] {
        app.create_post(&owner, title).await;
    }

    let (status, all) = app.call(Method::GET, "/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["third", "second", "first"]);

    let (_, page) = app.call(Method::GET, "/posts?page=1&size=2", None, None).await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["title"], "first");
    assert_eq!(page[0]["authorId"], owner.id.to_string());
}

#[tokio::test]
async fn unknown_identity_cannot_create() {
    let app = TestApp::new(IdentityMode::Header).await;
    let ghost = common::Actor {
        id: uuid::Uuid::new_v4(),
        token: String::new(),
    };

    let (status, body) = app
        .call(
            Method::POST,
            "/posts",
            Some(&ghost),
            Some(json!({ "title": "t", "content": "c" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}
