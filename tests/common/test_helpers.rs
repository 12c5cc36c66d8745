use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use tower::ServiceExt;
use veilroute::dispatch::AliasRouter;
use veilroute::{
    AccessLogService, Credentials, Envelope, ErrorBody, LoginGrant, MessagePackCodec, Server,
    ServerConfig, StaticAuthenticator, WireCodec,
};

pub const USER: &str = "alice";
pub const PASSWORD: &str = "correct horse";

pub type TestService = AccessLogService<AliasRouter>;

/// Server with `echo` (returns the payload) and `shout` (upper-cases it).
pub fn create_test_server(config: ServerConfig) -> Server {
    Server::builder(config)
        .authenticator(StaticAuthenticator::new(vec![Credentials::new(USER, PASSWORD)]))
        .route("echo", |payload: Bytes| async move { payload })
        .route("shout", |payload: Bytes| async move { payload.to_ascii_uppercase() })
        .build()
        .expect("test server builds")
}

pub fn login_body(credentials: &Credentials) -> Vec<u8> {
    let codec = MessagePackCodec;
    let payload = codec.encode_credentials(credentials).unwrap();
    codec.encode_envelope(&Envelope::anonymous(payload)).unwrap()
}

pub fn request_body(token: &str, payload: &[u8]) -> Vec<u8> {
    MessagePackCodec.encode_envelope(&Envelope::new(token, payload.to_vec())).unwrap()
}

pub fn post(path: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(format!("/{path}")).body(Body::from(body)).unwrap()
}

pub async fn send(svc: &TestService, req: Request<Body>) -> (StatusCode, Bytes) {
    let response = svc.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

pub async fn login(svc: &TestService) -> LoginGrant {
    let (status, body) =
        send(svc, post("login", login_body(&Credentials::new(USER, PASSWORD)))).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

pub async fn call(svc: &TestService, grant: &LoginGrant, name: &str, payload: &[u8]) -> (StatusCode, Bytes) {
    let alias = grant.alias(name).expect("route in grant");
    send(svc, post(alias, request_body(&grant.token, payload))).await
}

pub fn error_body(body: &[u8]) -> ErrorBody {
    serde_json::from_slice(body).unwrap()
}

#[derive(Clone)]
struct SharedWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captured log output of the current thread at `INFO` and above.
pub struct LogCapture {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let buffer = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::writer::BoxMakeWriter::new(SharedWriter(
                buffer.clone(),
            )))
            .with_max_level(tracing::Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .finish();
        Self { buffer, _guard: tracing::subscriber::set_default(subscriber) }
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
    }
}
