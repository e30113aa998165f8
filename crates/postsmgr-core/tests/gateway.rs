//! End-to-end tests of the gateway client against a mock backend.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use postsmgr_core::api::{ApiErrorKind, ClientEvent, RequestDescriptor};
use postsmgr_core::models::{Credentials, ImageUpload, NewPost, PostUpdate, Registration, User};
use postsmgr_core::{ApiClient, Config, SessionStore};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

fn config_for(server: &Server) -> Config {
    Config {
        api_base_url: format!("{}/api", server.url()),
        ..Config::default()
    }
}

fn client_for(server: &Server) -> ApiClient {
    ApiClient::new(&config_for(server), Arc::new(SessionStore::in_memory())).expect("client")
}

fn ada() -> User {
    User {
        id: 1,
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        created_at: None,
        updated_at: None,
    }
}

const POSTS_BODY: &str = r#"[{"id":1,"title":"First","description":"Hello","image":null},{"id":2,"title":"Second","description":"World","image":"1700000000.png"}]"#;

#[tokio::test]
async fn test_login_then_list_sends_bearer() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/login")
        .match_header("content-type", "application/json")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"email": "ada@example.com", "password": "secret"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"ok","token":"1|tok","user":{"id":1,"name":"Ada","email":"ada@example.com"}}"#)
        .create_async()
        .await;
    let posts = server
        .mock("GET", "/api/posts")
        .match_header("authorization", "Bearer 1|tok")
        .match_header("accept", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(POSTS_BODY)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let user = client
        .login(&Credentials {
            email: "ada@example.com".to_string(),
            password: "secret".to_string(),
        })
        .await
        .expect("login");
    assert_eq!(user.name, "Ada");
    assert_eq!(client.session().get_token().as_deref(), Some("1|tok"));
    assert_eq!(client.session().user(), Some(user));

    // Envelope comes back unchanged
    let envelope = client
        .request(RequestDescriptor::get("posts"))
        .await
        .expect("envelope");
    let expected: serde_json::Value = serde_json::from_str(POSTS_BODY).expect("json");
    assert_eq!(envelope, expected);

    let list = client.list_posts().await.expect("posts");
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].image.as_deref(), Some("1700000000.png"));

    login.assert_async().await;
    posts.assert_async().await;
}

#[tokio::test]
async fn test_anonymous_request_has_no_bearer() {
    let mut server = Server::new_async().await;
    let posts = server
        .mock("GET", "/api/posts")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = client_for(&server);
    assert!(client.list_posts().await.expect("posts").is_empty());
    posts.assert_async().await;
}

#[tokio::test]
async fn test_401_clears_session_and_requests_login() {
    let mut server = Server::new_async().await;
    let posts = server
        .mock("GET", "/api/posts")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Unauthenticated."}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("expired", ada());
    let mut events = client.subscribe_events();

    let err = client.list_posts().await.expect_err("should be rejected");
    assert_eq!(err.kind(), ApiErrorKind::Auth);
    assert_eq!(err.status_code(), Some(401));
    assert_eq!(err.message(), "Unauthenticated.");

    assert!(!client.session().is_authenticated());
    assert_eq!(client.session().get_token(), None);
    assert_eq!(client.session().user(), None);
    assert_eq!(
        events.try_recv().expect("event"),
        ClientEvent::LoginRequired {
            redirect_to: "/login".to_string()
        }
    );
    posts.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_401s_clear_once() {
    let mut server = Server::new_async().await;
    let posts = server
        .mock("GET", "/api/posts")
        .with_status(401)
        .with_body(r#"{"message":"Unauthenticated."}"#)
        .expect(4)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("expired", ada());
    let mut events = client.subscribe_events();
    let mut observer = client.session().subscribe();

    let calls = (0..4).map(|_| {
        let client = client.clone();
        async move { client.list_posts().await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(e) if e.kind() == ApiErrorKind::Auth)));
    assert!(!client.session().is_authenticated());

    assert!(events.try_recv().is_ok());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    assert!(observer.has_changed().expect("open"));
    assert!(observer.borrow_and_update().is_none());
    posts.assert_async().await;
}

#[tokio::test]
async fn test_server_error_uses_backend_message() {
    let mut server = Server::new_async().await;
    let body = r#"{"message":"The title field is required.","errors":{"title":["The title field is required."]}}"#;
    server
        .mock("POST", "/api/posts")
        .with_status(422)
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("tok", ada());
    let err = client
        .create_post(NewPost::new("", "D"))
        .await
        .expect_err("validation failure");
    assert_eq!(err.kind(), ApiErrorKind::Server);
    assert_eq!(err.status_code(), Some(422));
    assert_eq!(err.message(), "The title field is required.");
    assert_eq!(err.raw_body(), Some(body));
    assert!(err.validation_errors().is_some());
    // Only 401 ends the session
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn test_server_error_generic_message() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/posts/9")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_post(9).await.expect_err("500");
    assert_eq!(err.message(), "HTTP 500 Error");
    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn test_create_without_image_sends_title_and_description() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/posts")
        .match_header("authorization", "Bearer tok")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("name=\"title\"\r\n\r\nT\r\n".to_string()),
            Matcher::Regex("name=\"description\"\r\n\r\nD\r\n".to_string()),
        ]))
        .with_status(201)
        .with_body(r#"{"message":"Post created","data":{"id":5,"title":"T","description":"D","image":null}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("tok", ada());
    let post = client.create_post(NewPost::new("T", "D")).await.expect("created");
    assert_eq!(post.id, 5);
    assert_eq!(post.title, "T");
    assert_eq!(post.image, None);
    create.assert_async().await;
}

#[tokio::test]
async fn test_create_with_image_sends_file_part() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/posts")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("name=\"image\"; filename=\"cat.png\"".to_string()),
            Matcher::Regex("Content-Type: image/png".to_string()),
        ]))
        .with_status(201)
        .with_body(r#"{"id":6,"title":"T","description":"D","image":"1700000001.png"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let post = NewPost::new("T", "D").with_image(ImageUpload::new("cat.png", b"PNG".to_vec()));
    let created = client.create_post(post).await.expect("created");
    assert_eq!(created.image.as_deref(), Some("1700000001.png"));
    create.assert_async().await;
}

#[tokio::test]
async fn test_update_tunnels_put_through_post() {
    let mut server = Server::new_async().await;
    let update = server
        .mock("POST", "/api/posts/3")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("name=\"_method\"\r\n\r\nPUT\r\n".to_string()),
            Matcher::Regex("name=\"title\"\r\n\r\nRenamed\r\n".to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"post":{"id":3,"title":"Renamed","description":"Same","image":null}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let post = client
        .update_post(
            3,
            PostUpdate {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("updated");
    assert_eq!(post.title, "Renamed");
    update.assert_async().await;
}

#[tokio::test]
async fn test_delete_returns_envelope() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/api/posts/4")
        .with_status(200)
        .with_body(r#"{"message":"Post deleted"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let envelope = client.delete_post(4).await.expect("deleted");
    assert_eq!(envelope["message"], "Post deleted");
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/api/posts/8")
        .with_status(204)
        .create_async()
        .await;

    let client = client_for(&server);
    assert_eq!(client.delete_post(8).await.expect("deleted"), serde_json::Value::Null);
}

#[tokio::test]
async fn test_register_starts_session() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/register")
        .match_body(Matcher::PartialJson(json!({
            "name": "Ada",
            "password_confirmation": "secret123"
        })))
        .with_status(201)
        .with_body(r#"{"access_token":"2|new","user":{"id":1,"name":"Ada","email":"ada@example.com"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let user = client
        .register(&Registration::new("Ada", "ada@example.com", "secret123"))
        .await
        .expect("registered");
    assert_eq!(user, ada());
    assert_eq!(client.session().get_token().as_deref(), Some("2|new"));
}

#[tokio::test]
async fn test_failed_login_keeps_anonymous_without_event() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/login")
        .with_status(401)
        .with_body(r#"{"message":"Invalid credentials"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let mut events = client.subscribe_events();
    let err = client
        .login(&Credentials {
            email: "ada@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .expect_err("rejected");
    assert_eq!(err.message(), "Invalid credentials");
    assert!(!client.session().is_authenticated());
    // Nothing was cleared, so nothing to announce
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_logout_clears_session_even_on_failure() {
    let mut server = Server::new_async().await;
    let logout = server
        .mock("POST", "/api/logout")
        .match_header("authorization", "Bearer tok")
        .with_status(500)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("tok", ada());
    let err = client.logout().await.expect_err("server failed");
    assert_eq!(err.status_code(), Some(500));
    assert!(!client.session().is_authenticated());
    logout.assert_async().await;

    // Anonymous logout makes no call
    client.logout().await.expect("no-op");
}

#[tokio::test]
async fn test_current_user_refreshes_session_user() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/user")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(r#"{"id":1,"name":"Ada L.","email":"ada@example.com"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.session().set_session("tok", ada());
    let user = client.current_user().await.expect("user");
    assert_eq!(user.name, "Ada L.");
    assert_eq!(client.session().user().map(|u| u.name), Some("Ada L.".to_string()));
}

#[tokio::test]
async fn test_invalid_json_success_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/posts")
        .with_status(200)
        .with_body("<html>proxy login</html>")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.list_posts().await.expect_err("not json");
    assert_eq!(err.kind(), ApiErrorKind::Server);
    assert_eq!(err.raw_body(), Some("<html>proxy login</html>"));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Grab a free port, then close it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = Config {
        api_base_url: format!("http://{}/api", addr),
        ..Config::default()
    };
    let client = ApiClient::new(&config, Arc::new(SessionStore::in_memory())).expect("client");
    let err = client.list_posts().await.expect_err("refused");
    assert_eq!(err.kind(), ApiErrorKind::Network);
    assert_eq!(err.status_code(), None);
    assert!(err.message().starts_with("No response from server"));
}

#[tokio::test]
async fn test_silent_server_times_out_as_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    // Accept and hold connections without ever answering
    let holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = Config {
        api_base_url: format!("http://{}/api", addr),
        timeout_secs: 1,
        ..Config::default()
    };
    let client = ApiClient::new(&config, Arc::new(SessionStore::in_memory())).expect("client");

    let started = std::time::Instant::now();
    let err = client.list_posts().await.expect_err("timeout");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(err.kind(), ApiErrorKind::Network);
    assert_eq!(err.status_code(), None);
    assert!(err.message().contains("timed out"));

    holder.abort();
}
