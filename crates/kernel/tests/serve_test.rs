#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the assembled application router.
//!
//! These drive the real router built by the bootstrapper with
//! `tower::ServiceExt::oneshot`; no listener is started.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use http_body_util::BodyExt;
use keystone_kernel::bootstrap::hook;
use keystone_kernel::module::PackageCatalog;
use keystone_kernel::{Bootstrap, Invocation, OverrideSource, SiteConfig};
use keystone_sdk::{
    Factory, ModuleHandle, NotFoundHandler, PageLoader, PageRequest, SiteModule, middleware,
};
use keystone_test_utils::{ADMIN_PASSWORD, Recorder, TempSite, declare_module, recording_factory};
use serde_json::Value;
use tower::ServiceExt;

async fn build(table: toml::Table, configure: impl FnOnce(Bootstrap) -> Bootstrap) -> Router {
    let config = SiteConfig::resolve(table, OverrideSource::None).unwrap();
    configure(Bootstrap::new(config, Invocation::Serve))
        .build()
        .await
        .unwrap()
        .router()
        .expect("serving builds a router")
}

async fn get_path(app: &Router, path: &str) -> Response {
    app.clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn login_request(password: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::post("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "username=admin&password={}",
            password.replace(' ', "+")
        )))
        .unwrap();
    if let Some(cookie) = cookie {
        request
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    }
    request
}

/// The `name=value` part of the response's session cookie.
fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response should set a session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

/// Page hook recording each call under `label`.
///
/// As a not-found handler it claims `/claim-<label>` with a redirect.
struct Tracer {
    label: String,
    recorder: Recorder,
}

impl Tracer {
    fn new(label: &str, recorder: &Recorder) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            recorder: recorder.clone(),
        })
    }
}

#[async_trait]
impl PageLoader for Tracer {
    async fn load(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        let global = request.extras.contains_key("global");
        self.recorder.record(format!("load:{} global={global}", self.label));
        Ok(())
    }
}

#[async_trait]
impl NotFoundHandler for Tracer {
    async fn handle(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        self.recorder.record(format!("miss:{}", self.label));
        if request.path == format!("/claim-{}", self.label) {
            request.redirect = Some(format!("/claimed-by-{}", self.label));
        }
        Ok(())
    }
}

struct TracedModule(Arc<Tracer>);

impl SiteModule for TracedModule {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn page_loader(&self) -> Option<Arc<dyn PageLoader>> {
        Some(self.0.clone())
    }

    fn not_found_handler(&self) -> Option<Arc<dyn NotFoundHandler>> {
        Some(self.0.clone())
    }
}

fn traced_factory(recorder: &Recorder) -> Factory {
    let recorder = recorder.clone();
    Factory::immediate(move |options| {
        let module: ModuleHandle = Arc::new(TracedModule(Tracer::new(&options.name, &recorder)));
        Ok(Some(module))
    })
}

fn blog_with_redirects() -> toml::Table {
    toml::from_str(
        r#"
        [redirects]
        "/blog/old-launch" = "/blog/launch"
        "#,
    )
    .unwrap()
}

#[tokio::test]
async fn health_reports_module_count() {
    let site = TempSite::new().unwrap();
    let mut table = site.config();
    declare_module(&mut table, "keystone-blog", toml::Table::new());
    let mut catalog = PackageCatalog::new();
    catalog.register("keystone-blog", keystone_blog::factory());

    let app = build(table, |b| b.packages(catalog)).await;
    let response = get_path(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["modules"], 1);
    assert!(json.get("postgres").is_none());
}

#[tokio::test]
async fn home_page_renders_and_unknown_paths_are_not_found() {
    let site = TempSite::new().unwrap();
    let app = build(site.config(), |b| b).await;

    let home = get_path(&app, "/").await;
    assert_eq!(home.status(), StatusCode::OK);
    assert!(body_text(home).await.contains("Home"));

    let missing = get_path(&app, "/no-such-page").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    // Page templates autoescape, so the path's slashes come back as entities.
    assert!(body_text(missing).await.contains("&#x2F;no-such-page"));
}

#[tokio::test]
async fn page_type_templates_and_virtual_pages_render() {
    let site = TempSite::new().unwrap();
    site.write(
        "data/pages.toml",
        r#"
        [[page]]
        slug = "/about"
        title = "About us"
        type = "about"

        [[page]]
        slug = "global"
        title = "Acme"
        "#,
    )
    .unwrap();
    site.write(
        "views/pages/about.html",
        "<h1>{{ page.title }}</h1><footer>{{ extras.global.title }}</footer>",
    )
    .unwrap();
    site.write("views/pages/notFound.html", "<p>Lost: {{ path }}</p>")
        .unwrap();

    let app = build(site.config(), |b| b).await;

    let about = body_text(get_path(&app, "/about").await).await;
    assert_eq!(about, "<h1>About us</h1><footer>Acme</footer>");

    let missing = get_path(&app, "/gone").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(missing).await, "<p>Lost: &#x2F;gone</p>");
}

#[tokio::test]
async fn page_override_folder_wins_over_site_templates() {
    let site = TempSite::new().unwrap();
    site.write("views/pages/default.html", "site {{ page.title }}")
        .unwrap();
    site.write(
        "lib/modules/keystone-pages/views/default.html",
        "override {{ page.title }}",
    )
    .unwrap();

    let app = build(site.config(), |b| b).await;
    assert_eq!(body_text(get_path(&app, "/").await).await, "override Home");
}

#[tokio::test]
async fn module_not_found_handler_redirects_retired_slugs() {
    let site = TempSite::new().unwrap();
    let mut table = site.config();
    declare_module(&mut table, "keystone-blog", blog_with_redirects());
    let mut catalog = PackageCatalog::new();
    catalog.register("keystone-blog", keystone_blog::factory());

    let app = build(table, |b| b.packages(catalog)).await;

    let response = get_path(&app, "/blog/old-launch").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blog/launch");

    let unknown = get_path(&app, "/blog/never-existed").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn not_found_redirects_keep_the_prefix() {
    let site = TempSite::new().unwrap();
    let mut table = site.config();
    table.insert("prefix".into(), toml::Value::String("/site".into()));
    declare_module(&mut table, "keystone-blog", blog_with_redirects());
    let mut catalog = PackageCatalog::new();
    catalog.register("keystone-blog", keystone_blog::factory());

    let app = build(table, |b| b.packages(catalog)).await;

    let response = get_path(&app, "/site/blog/old-launch").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/site/blog/launch");
}

#[tokio::test]
async fn static_files_are_served_before_pages() {
    let site = TempSite::new().unwrap();
    site.write("public/robots.txt", "User-agent: *\n").unwrap();
    let app = build(site.config(), |b| b).await;

    let response = get_path(&app, "/robots.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "User-agent: *\n");
}

#[tokio::test]
async fn late_routes_take_precedence_over_pages() {
    let site = TempSite::new().unwrap();
    site.write("data/pages.toml", "[[page]]\nslug = \"/hello\"\ntitle = \"Page\"\n")
        .unwrap();

    let app = build(site.config(), |b| {
        b.late_routes(hook(|context| async move {
            context
                .app
                .add_routes(Router::new().route("/hello", get(|| async { "from a route" })));
            Ok::<(), anyhow::Error>(())
        }))
    })
    .await;

    assert_eq!(body_text(get_path(&app, "/hello").await).await, "from a route");
}

#[tokio::test]
async fn whole_app_is_nested_under_the_prefix() {
    let site = TempSite::new().unwrap();
    let mut table = site.config();
    table.insert("prefix".into(), toml::Value::String("/site/".into()));
    let app = build(table, |b| b).await;

    assert_eq!(get_path(&app, "/site/health").await.status(), StatusCode::OK);
    assert_eq!(get_path(&app, "/site").await.status(), StatusCode::OK);
    assert_eq!(get_path(&app, "/health").await.status(), StatusCode::NOT_FOUND);

    let login = body_text(get_path(&app, "/site/login").await).await;
    assert!(login.contains("action=\"/site/login\""));
}

#[tokio::test]
async fn page_middleware_wraps_only_the_page_handler() {
    let site = TempSite::new().unwrap();
    let app = build(site.config(), |b| {
        b.middleware(middleware(|request, next| async move {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-site", HeaderValue::from_static("1"));
            response
        }))
        .page_middleware(middleware(|request, next| async move {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-page", HeaderValue::from_static("1"));
            response
        }))
    })
    .await;

    let page = get_path(&app, "/").await;
    assert!(page.headers().contains_key("x-site"));
    assert!(page.headers().contains_key("x-page"));

    let health = get_path(&app, "/health").await;
    assert!(health.headers().contains_key("x-site"));
    assert!(!health.headers().contains_key("x-page"));
}

#[tokio::test]
async fn login_checks_the_admin_password() {
    let site = TempSite::new().unwrap();
    let app = build(site.config(), |b| b).await;

    let form = body_text(get_path(&app, "/login").await).await;
    assert!(form.contains("<form"));
    assert!(!form.contains("Forgot your password?"));

    let rejected = app
        .clone()
        .oneshot(login_request("wrong", None))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(rejected).await.contains("Invalid username or password"));

    let accepted = app
        .clone()
        .oneshot(login_request(ADMIN_PASSWORD, None))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&accepted), "/");
    assert!(session_cookie(&accepted).starts_with("testsite.sid="));
}

#[tokio::test]
async fn login_links_password_reset_when_people_module_is_present() {
    let site = TempSite::new().unwrap();
    let mut table = site.config();
    declare_module(&mut table, "keystone-people", toml::Table::new());
    let mut catalog = PackageCatalog::new();
    catalog.register("keystone-people", recording_factory(&Recorder::new()));

    let app = build(table, |b| b.packages(catalog)).await;
    let form = body_text(get_path(&app, "/login").await).await;
    assert!(form.contains("Forgot your password?"));
}

#[tokio::test]
async fn second_chance_login_returns_to_the_last_page() {
    let site = TempSite::new().unwrap();
    site.write("data/pages.toml", "[[page]]\nslug = \"/about\"\ntitle = \"About\"\n")
        .unwrap();
    let mut table = site.config();
    table.insert("second_chance_login".into(), toml::Value::Boolean(true));
    let app = build(table, |b| b).await;

    let visit = get_path(&app, "/about").await;
    assert_eq!(visit.status(), StatusCode::OK);
    let cookie = session_cookie(&visit);

    let login = app
        .clone()
        .oneshot(login_request(ADMIN_PASSWORD, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&login), "/about");
}

#[tokio::test]
async fn locale_cookie_selects_a_configured_language() {
    let site = TempSite::new().unwrap();
    site.write("views/pages/default.html", "lang={{ locale }}")
        .unwrap();
    let mut table = site.config();
    table.insert(
        "i18n".into(),
        toml::Value::Table(toml::from_str("locales = [\"en\", \"fr\"]").unwrap()),
    );
    let app = build(table, |b| b).await;

    let french = app
        .clone()
        .oneshot(
            Request::get("/")
                .header(header::COOKIE, "site_language=fr")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_text(french).await, "lang=fr");

    let unknown = app
        .clone()
        .oneshot(
            Request::get("/")
                .header(header::COOKIE, "site_language=de")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_text(unknown).await, "lang=en");
}

#[tokio::test]
async fn page_hooks_run_global_then_modules_then_caller() {
    let site = TempSite::new().unwrap();
    let recorder = Recorder::new();
    let mut table = site.config();
    declare_module(&mut table, "beta", toml::Table::new());
    declare_module(&mut table, "alpha", toml::Table::new());
    let mut catalog = PackageCatalog::new();
    catalog.register("alpha", traced_factory(&recorder));
    catalog.register("beta", traced_factory(&recorder));

    let caller = Tracer::new("site", &recorder);
    let app = build(table, |b| {
        b.packages(catalog)
            .page_loader(caller.clone())
            .not_found(caller)
    })
    .await;

    let response = get_path(&app, "/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        recorder.events(),
        [
            "load:beta global=true",
            "load:alpha global=true",
            "load:site global=true",
            "miss:beta",
            "miss:alpha",
            "miss:site",
        ]
    );
}

#[tokio::test]
async fn caller_not_found_runs_only_when_no_module_claims() {
    let site = TempSite::new().unwrap();
    let recorder = Recorder::new();
    let mut table = site.config();
    declare_module(&mut table, "beta", toml::Table::new());
    declare_module(&mut table, "alpha", toml::Table::new());
    let mut catalog = PackageCatalog::new();
    catalog.register("alpha", traced_factory(&recorder));
    catalog.register("beta", traced_factory(&recorder));

    let caller = Tracer::new("site", &recorder);
    let app = build(table, |b| b.packages(catalog).not_found(caller)).await;

    let response = get_path(&app, "/claim-beta").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/claimed-by-beta");
    let misses: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|event| event.starts_with("miss:"))
        .collect();
    assert_eq!(misses, ["miss:beta"]);

    let response = get_path(&app, "/claim-site").await;
    assert_eq!(location(&response), "/claimed-by-site");
    assert_eq!(
        recorder
            .events()
            .iter()
            .filter(|event| *event == "miss:site")
            .count(),
        1
    );
}
