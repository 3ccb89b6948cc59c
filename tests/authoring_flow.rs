mod common;

use axum::http::StatusCode;
use common::{
    EMAIL, PASSWORD, body_text, get, location, post_form, send, set_cookie, sign_in, site,
};
use kubinet::infra::http::SESSION_COOKIE;

#[tokio::test]
async fn created_post_is_served_and_gone_after_delete() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(
        &site.router,
        post_form(
            "/blog/create",
            Some(&cookie),
            &[
                ("title", "Hello"),
                ("content", "World"),
                ("slug", "hello"),
                ("published", "on"),
                ("intent", "save"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/blog/hello"));
    assert!(set_cookie(&response, "kubinet_flash").is_some());

    let response = send(&site.router, get("/blog/hello", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("<h1>Hello</h1>"));
    assert!(html.contains("<p>World</p>"));

    let response = send(&site.router, get("/blog", None)).await;
    assert!(body_text(response).await.contains("/blog/hello"));

    let response = send(
        &site.router,
        post_form("/blog/hello/delete", Some(&cookie), &[]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/blog"));

    let response = send(&site.router, get("/blog/hello", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("404"));
}

#[tokio::test]
async fn drafts_are_hidden_from_anonymous_readers() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(
        &site.router,
        post_form(
            "/blog/create",
            Some(&cookie),
            &[("title", "Taslak Yazı"), ("content", "gizli")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let path = location(&response).expect("redirect to the post").to_string();

    let anonymous = send(&site.router, get(&path, None)).await;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);

    let author = send(&site.router, get(&path, Some(&cookie))).await;
    assert_eq!(author.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_fields_keep_the_form() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(
        &site.router,
        post_form(
            "/blog/create",
            Some(&cookie),
            &[("title", "Sadece başlık"), ("content", "   ")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(html.contains("Lütfen tüm alanları doldurun"));
    assert!(html.contains("Sadece başlık"));
}

#[tokio::test]
async fn preview_renders_without_saving() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(
        &site.router,
        post_form(
            "/blog/create",
            Some(&cookie),
            &[
                ("title", "Önizleme"),
                ("content", "**kalın**"),
                ("slug", "onizleme"),
                ("intent", "preview"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("<strong>kalın</strong>"));

    let response = send(&site.router, get("/blog/onizleme", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_authoring_redirects_with_a_toast() {
    let site = site();

    let response = send(&site.router, get("/blog/create", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/blog"));
    let flash = set_cookie(&response, "kubinet_flash").expect("flash cookie");

    let response = send(&site.router, get("/blog", Some(&flash))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("Bu sayfaya erişmek için oturum açmanız gerekiyor")
    );
}

#[tokio::test]
async fn homepage_edit_is_saved_and_rendered() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(
        &site.router,
        post_form(
            "/pages/homepage/edit",
            Some(&cookie),
            &[("content", "# Merhaba"), ("intent", "save")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));

    let response = send(&site.router, get("/", None)).await;
    assert!(body_text(response).await.contains("Merhaba</h1>"));
}

#[tokio::test]
async fn login_is_refused_before_the_secret() {
    let site = site();
    let response = send(&site.router, get("/auth", None)).await;
    let cookie = set_cookie(&response, SESSION_COOKIE).expect("session cookie issued");

    let response = send(
        &site.router,
        post_form(
            "/auth/login",
            Some(&cookie),
            &[("email", EMAIL), ("password", PASSWORD)],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(location(&response).is_none());
    assert!(
        body_text(response)
            .await
            .contains("Lütfen gizli anahtarı giriniz")
    );

    let response = send(&site.router, get("/blog/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/blog"));
}

#[tokio::test]
async fn wrong_secret_counts_down_then_locks() {
    let site = site();
    let response = send(&site.router, get("/auth", None)).await;
    let cookie = set_cookie(&response, SESSION_COOKIE).expect("session cookie issued");

    for left in (1..=4).rev() {
        let response = send(
            &site.router,
            post_form("/auth/secret", Some(&cookie), &[("secret", "yanlış")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(
            body_text(response)
                .await
                .contains(&format!("{left} deneme hakkınız kaldı"))
        );
    }

    let response = send(
        &site.router,
        post_form("/auth/secret", Some(&cookie), &[("secret", "yanlış")]),
    )
    .await;
    assert!(body_text(response).await.contains("5 dakika kilitlendi"));

    // Locked: even the right secret is turned away.
    let response = send(
        &site.router,
        post_form("/auth/secret", Some(&cookie), &[("secret", common::SECRET_KEY)]),
    )
    .await;
    assert!(
        body_text(response)
            .await
            .contains("Çok fazla başarısız deneme")
    );
}

#[tokio::test]
async fn logout_ends_the_session() {
    let site = site();
    let cookie = sign_in(&site.router).await;

    let response = send(&site.router, get("/blog/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&site.router, post_form("/auth/logout", Some(&cookie), &[])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = send(&site.router, get("/blog/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/blog"));
}
