//! Push channel and command delivery tests

use std::time::Duration;

use axum::{
    Router,
    body::{Body, BodyDataStream},
    http::{Request, StatusCode},
    response::Response,
};
use futures::StreamExt;
use mattone::api::ApiState;
use mattone::sessions::{Command, DispatchError};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{Upstream, bearer, build_server, setup_test_db};

const CONNECTED: &str = "data: {\"type\":\"connected\"}\n\n";
const HEARTBEAT: &str = ":heartbeat\n\n";

/// Splits a push channel body into whole event frames
struct FrameReader {
    body: BodyDataStream,
    buf: String,
}

impl FrameReader {
    fn new(response: Response) -> Self {
        Self {
            body: response.into_body().into_data_stream(),
            buf: String::new(),
        }
    }

    /// Next complete frame, or `None` once the stream has ended
    async fn next(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame = self.buf[..end + 2].to_string();
                self.buf.drain(..end + 2);
                return Some(frame);
            }

            let chunk = tokio::time::timeout(Duration::from_secs(5), self.body.next())
                .await
                .expect("timed out waiting for a frame")?
                .expect("body error");
            self.buf.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    /// Next frame that is not a heartbeat
    async fn next_event(&mut self) -> Option<String> {
        loop {
            let frame = self.next().await?;
            if frame != HEARTBEAT {
                return Some(frame);
            }
        }
    }
}

struct Harness {
    app: Router,
    state: std::sync::Arc<ApiState>,
    _upstream: Upstream,
}

impl Harness {
    async fn start() -> Self {
        let upstream = Upstream::start().await;
        let server = build_server(setup_test_db(), &upstream);
        Self {
            app: server.router(),
            state: server.state(),
            _upstream: upstream,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, subject: &str, code: &str) -> String {
        let response = self
            .send(
                Request::post("/devices")
                    .header("Authorization", bearer(subject))
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({"device_code": code}).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        json["id"].as_str().unwrap().to_string()
    }

    async fn connect(&self, code: &str) -> Response {
        self.send(
            Request::get("/sse/events")
                .header("X-Device-ID", code)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn play(&self, subject: &str, device_id: &str, body: Value) -> Response {
        self.send(
            Request::post(format!("/devices/{device_id}/play"))
                .header("Authorization", bearer(subject))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn wait_until(&self, mut done: impl FnMut(&ApiState) -> bool) {
        for _ in 0..100 {
            if done(self.state.as_ref()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }
}

#[tokio::test]
async fn test_play_reaches_connected_device_exactly_once() {
    let h = Harness::start().await;
    let d1 = h.register("alice", "D1").await;

    let response = h.connect("D1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers()["cache-control"].to_str().unwrap(), "no-cache");

    let mut frames = FrameReader::new(response);
    assert_eq!(frames.next().await.unwrap(), CONNECTED);

    let response = h
        .play("alice", &d1, json!({"type": "youtube", "videoId": "abc"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({"status": "command sent"})
    );

    assert_eq!(
        frames.next_event().await.unwrap(),
        "data: {\"type\":\"play\",\"payload\":{\"videoId\":\"abc\"}}\n\n"
    );

    // Nothing but heartbeats follow
    for _ in 0..2 {
        assert_eq!(frames.next().await.unwrap(), HEARTBEAT);
    }
}

#[tokio::test]
async fn test_dispatch_to_unconnected_device() {
    let h = Harness::start().await;
    h.register("alice", "D1").await;
    let d2 = h.register("alice", "D2").await;

    let response = h.connect("D1").await;
    let mut frames = FrameReader::new(response);
    assert_eq!(frames.next().await.unwrap(), CONNECTED);

    let err = h
        .state
        .dispatcher
        .send("D2", &Command::play_video("abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotConnected(id) if id == "D2"));

    let response = h
        .play("alice", &d2, json!({"type": "m3u", "url": "http://streams/alpha"}))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stop_command_payload() {
    let h = Harness::start().await;
    let d1 = h.register("alice", "D1").await;

    let mut frames = FrameReader::new(h.connect("D1").await);
    assert_eq!(frames.next().await.unwrap(), CONNECTED);

    let response = h
        .send(
            Request::post(format!("/devices/{d1}/stop"))
                .header("Authorization", bearer("alice"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        frames.next_event().await.unwrap(),
        "data: {\"type\":\"stop\",\"payload\":{}}\n\n"
    );
}

#[tokio::test]
async fn test_push_channel_rejects_unknown_devices() {
    let h = Harness::start().await;

    let response = h
        .send(Request::get("/sse/events").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h.connect("never-registered").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(h.state.sessions.is_empty());
}

#[tokio::test]
async fn test_disconnect_releases_session() {
    let h = Harness::start().await;
    h.register("alice", "D1").await;

    let mut frames = FrameReader::new(h.connect("D1").await);
    assert_eq!(frames.next().await.unwrap(), CONNECTED);

    let response = h
        .send(
            Request::get("/devices")
                .header("Authorization", bearer("alice"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let devices: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(devices[0]["connected"], true);

    drop(frames);
    h.wait_until(|state| !state.sessions.is_connected("D1")).await;
}

#[tokio::test]
async fn test_newer_connection_receives_commands() {
    let h = Harness::start().await;
    let d1 = h.register("alice", "D1").await;

    let mut old = FrameReader::new(h.connect("D1").await);
    assert_eq!(old.next().await.unwrap(), CONNECTED);
    let mut new = FrameReader::new(h.connect("D1").await);
    assert_eq!(new.next().await.unwrap(), CONNECTED);

    let response = h
        .play("alice", &d1, json!({"type": "youtube", "videoId": "xyz"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        new.next_event().await.unwrap(),
        "data: {\"type\":\"play\",\"payload\":{\"videoId\":\"xyz\"}}\n\n"
    );
    // The replaced connection only keeps receiving heartbeats
    assert_eq!(old.next().await.unwrap(), HEARTBEAT);

    // Closing the replaced connection leaves the newer one registered
    drop(old);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.state.sessions.is_connected("D1"));
}

#[tokio::test]
async fn test_deleting_device_ends_its_stream() {
    let h = Harness::start().await;
    let d1 = h.register("alice", "D1").await;

    let mut frames = FrameReader::new(h.connect("D1").await);
    assert_eq!(frames.next().await.unwrap(), CONNECTED);

    let response = h
        .send(
            Request::delete(format!("/devices/{d1}"))
                .header("Authorization", bearer("alice"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!h.state.sessions.is_connected("D1"));

    assert_eq!(frames.next_event().await, None);
}
