use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use livepreview::inject::RELOAD_SNIPPET;
use std::env;
use std::time::Duration;

mod common;
use common::http_client::{get, request};
use common::test_server::{quiet_options, start};

fn assert_injected(body: &str) {
    assert!(body.contains("<script "), "no reload client in {body:?}");
    assert!(body.contains(RELOAD_SNIPPET));
}

#[test]
fn test_standard_request() {
    let (server, port) = start(quiet_options(), 0);
    let res = get(port, "/sample");
    assert_eq!(res.status, 200);
    assert!(res.body.starts_with("SAMPLE"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_one_sync_middleware() {
    let options = quiet_options().middleware(|_, _, next| {
        next.proceed();
        Ok(())
    });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert_eq!(res.status, 200);
    assert!(res.body.starts_with("SAMPLE"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_two_sync_middleware() {
    let options = quiet_options()
        .middleware(|_, _, next| {
            next.proceed();
            Ok(())
        })
        .middleware(|_, _, next| {
            next.proceed();
            Ok(())
        });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert!(res.body.starts_with("SAMPLE"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_suspending_middleware_proceed() {
    let options = quiet_options()
        .middleware(|_, _, next| {
            may::coroutine::sleep(Duration::from_millis(10));
            next.proceed();
            Ok(())
        })
        .middleware(|_, _, next| {
            may::coroutine::sleep(Duration::from_millis(10));
            next.proceed();
            Ok(())
        });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert!(res.body.starts_with("SAMPLE"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_suspending_middleware_that_writes() {
    let options = quiet_options().middleware(|_, res, _| {
        let (tx, rx) = may::sync::mpsc::channel();
        may::go!(move || {
            may::coroutine::sleep(Duration::from_millis(10));
            let _ = tx.send("Injected");
        });
        let data = rx.recv()?;
        res.write_head(
            StatusCode::OK,
            [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
        );
        res.write(data);
        res.end();
        Ok(())
    });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert_eq!(res.status, 200);
    assert!(res.body.starts_with("Injected"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_second_suspending_middleware_that_writes() {
    let options = quiet_options()
        .middleware(|_, _, next| {
            may::coroutine::sleep(Duration::from_millis(10));
            next.proceed();
            Ok(())
        })
        .middleware(|_, res, _| {
            may::coroutine::sleep(Duration::from_millis(10));
            res.write_head(
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            );
            res.end_with("Injected");
            Ok(())
        });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert!(res.body.starts_with("Injected"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_second_middleware_consumes_first_body() {
    let options = quiet_options()
        .middleware(|_, res, next| {
            res.write_head(
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            );
            res.write("First ");
            next.proceed();
            Ok(())
        })
        .middleware(|_, res, _| {
            if let Some(body) = res.body_mut() {
                body.extend_from_slice(b"Second ");
            }
            res.end();
            Ok(())
        });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert!(res.body.starts_with("First Second "));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_end_in_first_skips_second() {
    let options = quiet_options()
        .middleware(|_, res, _| {
            res.write_head(
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            );
            res.write("First ");
            res.end();
            Ok(())
        })
        .middleware(|_, res, next| {
            res.write("Second ");
            next.proceed();
            Ok(())
        });
    let (server, port) = start(options, 0);
    let res = get(port, "/sample");
    assert!(res.body.starts_with("First "));
    assert!(!res.body.starts_with("First Second "));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_unicode_path() {
    let (server, port) = start(quiet_options(), 0);
    let res = get(port, "/zach%E2%80%99s.html");
    assert_eq!(res.status, 200);
    assert!(res.body.starts_with("This is a test"));
    assert_injected(&res.body);
    server.close();
}

#[test]
fn test_content_type_via_middleware() {
    let options = quiet_options().middleware(|req, res, next| {
        if req.path.ends_with(".php") {
            res.set_header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
        }
        next.proceed();
        Ok(())
    });
    let (server, port) = start(options, 0);
    let res = get(port, "/index.php");
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(res.body.starts_with("<?php"));
    server.close();
}

#[test]
fn test_not_found_and_method_not_allowed() {
    let (server, port) = start(quiet_options(), 0);
    let missing = get(port, "/nope.html");
    assert_eq!(missing.status, 404);
    assert_injected(&missing.body);

    let post = request(port, "POST", "/sample.html", &[("Content-Length", "0")]);
    assert_eq!(post.status, 405);
    assert_eq!(post.header("allow"), Some("GET, HEAD"));
    server.close();
}

#[test]
fn test_failing_middleware_answers_500_and_keeps_serving() {
    let options = quiet_options().middleware(|req, _, next| {
        if req.path == "/boom" {
            panic!("middleware exploded");
        }
        next.proceed();
        Ok(())
    });
    let (server, port) = start(options, 0);
    assert_eq!(get(port, "/boom").status, 500);
    assert_eq!(get(port, "/hello.txt").body, "Hello\n");
    server.close();
}

#[test]
fn test_directory_serves_index() {
    let (server, port) = start(quiet_options(), 0);
    let res = get(port, "/docs/");
    assert_eq!(res.status, 200);
    assert!(res.body.contains("<h1>Docs</h1>"));
    let snippet_at = res.body.find(RELOAD_SNIPPET).unwrap();
    assert!(snippet_at < res.body.find("</body>").unwrap());
    server.close();
}

// Base URL tests use distinct variables so they can run alongside each other.

#[test]
fn test_base_url_is_published_while_serving() {
    const VAR: &str = "LIVEPREVIEW_TEST_BASEURL_PUBLISHED";
    let mut options = quiet_options().inject_base_url(true);
    options.config.base_url_env_var = VAR.to_string();
    let (server, port) = start(options, 0);
    assert_eq!(get(port, "/").status, 200);
    assert_eq!(
        env::var(VAR).unwrap(),
        format!("http://localhost:{port}/")
    );
    server.close();
    assert!(env::var(VAR).is_err());
}

#[test]
fn test_base_url_not_published_by_default() {
    const VAR: &str = "LIVEPREVIEW_TEST_BASEURL_DEFAULT_OFF";
    let mut options = quiet_options();
    options.config.base_url_env_var = VAR.to_string();
    let (server, port) = start(options, 0);
    assert_eq!(get(port, "/").status, 200);
    assert!(env::var(VAR).is_err());
    server.close();
}
