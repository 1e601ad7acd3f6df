//! End-to-end tests for the attribute macros.
//!
//! Components are declared only with attributes, bootstrapped into an
//! application and driven with in-memory requests.

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use truss::prelude::*;
use truss::{ClassMetadata, DescriptorTarget, MountRegistry};

#[middleware]
struct Stamp;

#[routes]
impl Stamp {
    #[handle]
    fn handle(&self, #[response] res: Response, #[next] next: Next) {
        res.header("X-Stamp", "truss");
        next.call();
    }
}

#[controller("/items")]
struct Items {
    created: AtomicUsize,
}

#[routes]
impl Items {
    #[get]
    fn list(&self, #[query("q")] q: Option<String>) -> Value {
        json!({ "items": ["a", "b"], "q": q })
    }

    #[get(path = "/old", response = "redirect")]
    fn old() -> &'static str {
        "/v1/items"
    }

    #[get("/quiet")]
    fn quiet(&self, #[header("x-mode")] mode: Option<String>) -> Option<Value> {
        mode.map(|m| json!({ "mode": m }))
    }

    #[get("/:id")]
    fn show(
        &self,
        #[param("id")] id: u64,
        #[query("fields")] fields: Option<String>,
    ) -> Result<Value, Error> {
        if id == 0 {
            return Err(Error::NotFound(format!("item {}", id)));
        }
        Ok(json!({ "id": id, "fields": fields }))
    }

    #[get("/echo/:word")]
    fn echo(&self, #[param("word")] word: &str, #[query("suffix")] suffix: &str) -> String {
        format!("{}{}", word, suffix)
    }

    #[post]
    fn create(
        &self,
        #[body("name")] name: String,
        #[status] status: Status,
        #[request] req: Arc<HttpRequest>,
    ) -> Json<Value> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        status.set(201);
        Json(json!({
            "name": name,
            "count": n,
            "agent": req.header("user-agent"),
        }))
    }

    #[get("/slow/:id")]
    async fn slow(&self, #[param("id")] id: u64) -> Result<Value, Error> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if id == 0 {
            return Err(Error::BadRequest("id must be positive".to_string()));
        }
        Ok(json!({ "id": id, "slow": true }))
    }

    #[delete("/:id")]
    fn remove(&self, #[param("id")] _id: u64, #[response] res: Response) -> Result<(), Error> {
        res.send_status(204)
    }

    #[route(method = "PUT", path = "/count")]
    fn count(self: Arc<Self>) -> Value {
        json!({ "created": self.created.load(Ordering::SeqCst) })
    }
}

#[controller(path = "/pages", response = "send")]
struct Pages;

#[routes]
impl Pages {
    #[get("/hello")]
    fn hello(&self, #[query("name")] name: Option<String>) -> String {
        format!("<h1>Hello, {}</h1>", name.unwrap_or_else(|| "world".to_string()))
    }

    #[get(path = "/data", response = "json")]
    fn data(&self) -> Value {
        json!({ "page": "data" })
    }

    #[get(path = "/template", response = "render")]
    fn template(&self) -> Value {
        json!({ "view": "index" })
    }
}

#[exception]
struct Catch;

#[routes]
impl Catch {
    #[intercept]
    fn catch(&self, #[error] err: Option<Arc<Error>>, #[status] status: Status) -> Value {
        let code = err.as_ref().map(|e| e.status_code()).unwrap_or(500);
        status.set(code);
        json!({
            "caught": true,
            "code": code,
            "message": err.map(|e| e.to_string()),
        })
    }
}

fn app() -> Application {
    Application::bootstrap(
        AppConfig::new()
            .middleware(Stamp)
            .controller(Items {
                created: AtomicUsize::new(0),
            })
            .controller(Pages)
            .exception(Catch),
    )
    .unwrap()
}

#[test]
fn test_generated_metadata() {
    let metadata: ClassMetadata<Items> = Items::metadata();

    assert_eq!(metadata.path(), Some("/items"));
    assert!(metadata.is_compiled());
    assert!(metadata.orphan_bindings().is_empty());

    let keys: Vec<&str> = metadata.descriptors().map(|(key, _)| key).collect();
    assert_eq!(
        keys,
        vec!["list", "old", "quiet", "show", "echo", "create", "slow", "remove", "count"]
    );

    let show = metadata.descriptor("show").unwrap();
    assert_eq!(show.bindings.len(), 2);
    assert_eq!(show.route().map(|r| r.path.as_str()), Some("/:id"));
    assert_eq!(metadata.bindings("create").len(), 3);
    assert!(metadata.bindings("count").is_empty());

    let old = metadata.descriptor("old").unwrap();
    assert_eq!(
        old.route().and_then(|r| r.response_type),
        Some(ResponseAction::Redirect)
    );

    let catch = Catch::metadata();
    assert!(matches!(
        catch.descriptor(truss::INTERCEPT_KEY).map(|d| &d.target),
        Some(DescriptorTarget::Intercept)
    ));
    assert_eq!(Pages::metadata().response_type(), Some(ResponseAction::Send));
}

#[tokio::test]
async fn test_query_binding_and_middleware() {
    let res = app().handle(HttpRequest::new("GET", "/v1/items?q=bolts")).await;

    assert_eq!(res.status, 200);
    assert_eq!(
        res.json_body().unwrap(),
        json!({ "items": ["a", "b"], "q": "bolts" })
    );
    assert_eq!(res.headers.get("X-Stamp").map(String::as_str), Some("truss"));
}

#[tokio::test]
async fn test_param_and_optional_query_binding() {
    let app = app();

    let res = app
        .handle(HttpRequest::new("GET", "/v1/items/12?fields=name"))
        .await;
    assert_eq!(res.json_body().unwrap(), json!({ "id": 12, "fields": "name" }));

    let res = app.handle(HttpRequest::new("GET", "/v1/items/12")).await;
    assert_eq!(res.json_body().unwrap(), json!({ "id": 12, "fields": null }));
}

#[tokio::test]
async fn test_str_binding_requires_value() {
    let app = app();

    let res = app
        .handle(HttpRequest::new("GET", "/v1/items/echo/bolt?suffix=s"))
        .await;
    assert_eq!(res.json_body().unwrap(), json!("bolts"));

    let res = app.handle(HttpRequest::new("GET", "/v1/items/echo/bolt")).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.json_body().unwrap()["caught"], true);
}

#[tokio::test]
async fn test_body_status_and_request_binding() {
    let app = app();
    let request = HttpRequest::new("POST", "/v1/items")
        .with_header("User-Agent", "tests")
        .with_json(&json!({ "name": "bolt" }))
        .unwrap();

    let res = app.handle(request).await;
    assert_eq!(res.status, 201);
    assert_eq!(
        res.json_body().unwrap(),
        json!({ "name": "bolt", "count": 1, "agent": "tests" })
    );

    let res = app.handle(HttpRequest::new("PUT", "/v1/items/count")).await;
    assert_eq!(res.json_body().unwrap(), json!({ "created": 1 }));
}

#[tokio::test]
async fn test_async_method() {
    let app = app();

    let res = app.handle(HttpRequest::new("GET", "/v1/items/slow/3")).await;
    assert_eq!(res.json_body().unwrap(), json!({ "id": 3, "slow": true }));

    let res = app.handle(HttpRequest::new("GET", "/v1/items/slow/0")).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.json_body().unwrap()["caught"], true);
}

#[tokio::test]
async fn test_failure_reaches_exception() {
    let res = app().handle(HttpRequest::new("GET", "/v1/items/0")).await;

    assert_eq!(res.status, 404);
    let body = res.json_body().unwrap();
    assert_eq!(body["caught"], true);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_unparseable_param_is_bad_request() {
    let res = app().handle(HttpRequest::new("GET", "/v1/items/abc")).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.json_body().unwrap()["caught"], true);
}

#[tokio::test]
async fn test_route_response_action() {
    let res = app().handle(HttpRequest::new("GET", "/v1/items/old")).await;

    assert_eq!(res.status, 302);
    assert_eq!(
        res.headers.get("Location").map(String::as_str),
        Some("/v1/items")
    );
}

#[tokio::test]
async fn test_method_writes_response_itself() {
    let res = app().handle(HttpRequest::new("DELETE", "/v1/items/4")).await;

    assert_eq!(res.status, 204);
}

#[tokio::test]
async fn test_falsy_result_dispatches_nothing() {
    let app = app();

    let res = app
        .handle(HttpRequest::new("GET", "/v1/items/quiet").with_header("X-Mode", "loud"))
        .await;
    assert_eq!(res.json_body().unwrap(), json!({ "mode": "loud" }));

    let res = app.handle(HttpRequest::new("GET", "/v1/items/quiet")).await;
    assert_eq!(res.status, 200);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn test_class_response_type_and_override() {
    let app = app();

    let res = app
        .handle(HttpRequest::new("GET", "/v1/pages/hello?name=truss"))
        .await;
    assert_eq!(res.text(), "<h1>Hello, truss</h1>");
    assert_eq!(
        res.headers.get("Content-Type").map(String::as_str),
        Some("text/html; charset=utf-8")
    );

    let res = app.handle(HttpRequest::new("GET", "/v1/pages/data")).await;
    assert_eq!(res.json_body().unwrap(), json!({ "page": "data" }));
}

#[tokio::test]
async fn test_unsupported_action_is_reported() {
    let res = app().handle(HttpRequest::new("GET", "/v1/pages/template")).await;

    assert_eq!(res.status, 500);
    assert_eq!(res.json_body().unwrap()["caught"], true);
}

#[tokio::test]
async fn test_shared_registry_across_applications() {
    let registry = Arc::new(MountRegistry::default());
    let config = || AppConfig::new().controller(Pages);

    let first = Application::bootstrap_with(config(), registry.clone()).unwrap();
    let second = Application::bootstrap_with(config(), registry.clone()).unwrap();

    assert!(registry.has_router::<Pages>());
    assert_eq!(registry.router::<Pages>().route_count(), 6);

    let res = second
        .handle(HttpRequest::new("GET", "/v1/pages/hello"))
        .await;
    assert_eq!(res.text(), "<h1>Hello, world</h1>");
    drop(first);
}
