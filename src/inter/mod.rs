/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `store`.)

Every request passes through `session_layer()`, which attaches a session key
to the request (and hands out a cookie when the session is new). Everything
but the login pages also passes through `require_login()`.
*/
use std::{
    collections::HashMap,
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{Extension, FromRequestParts},
    headers::{Cookie, HeaderMapExt},
    http::{header, request::Parts, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use handlebars::{handlebars_helper, Handlebars};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use crate::{
    config::Glob,
    session::{Category, SessionUser, COOKIE_NAME},
    store::{DbError, Repo},
};

pub mod exercises;
pub mod lessons;
pub mod levels;
pub mod login;
pub mod progress;
pub mod students;
pub mod teachers;
pub mod users;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// How a value reads on the page; ids from forms are strings, ids from
/// the store are numbers.
fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        x => x.to_string(),
    }
}

handlebars_helper!(same: |a: Json, b: Json| as_text(a) == as_text(b));

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>aula | Error</title>
<link rel="stylesheet" href="/static/aula.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

/**
Initializes the resources used in this module. This function should be called
before any functionality of this module or any of its submodules is used.

Currently the only thing that happens here is loading the templates used by
`serve_template()`.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_helper("same", Box::new(same));
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    let templates = match TEMPLATES.get() {
        Some(t) => t,
        None => {
            log::error!("serve_template() called before inter::init().");
            return html_500();
        },
    };

    match templates.render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).into_response(),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// Shallow-merge the keys of `extra` into `base`. Non-object values are
/// left alone.
pub fn merged(mut base: Value, extra: Value) -> Value {
    if let (Some(b), Value::Object(e)) = (base.as_object_mut(), extra) {
        for (k, v) in e.into_iter() {
            b.insert(k, v);
        }
    }
    base
}

/// Interpret a form value as optional: surrounding whitespace is dropped
/// and what remains, if anything, is returned.
pub fn blank_means_none(s: &str) -> Option<&str> {
    match s.trim() {
        "" => None,
        x => Some(x),
    }
}

/// Parse an id out of a form field; blank or garbage gives `None`.
pub fn parse_id(s: &str) -> Option<i64> {
    blank_means_none(s).and_then(|s| s.parse().ok())
}

/// Session key attached to each request by `session_layer()`.
#[derive(Clone, Debug)]
pub struct SessionKey(pub String);

/// Middleware that makes sure every request has a session.
pub async fn session_layer<B>(
    mut req: Request<B>,
    next: Next<B>
) -> Response {
    let glob = match req.extensions().get::<Arc<Glob>>() {
        Some(glob) => glob.clone(),
        None => {
            log::error!("No Glob extension present in session_layer().");
            return html_500();
        },
    };

    let cookie_value = req.headers().typed_get::<Cookie>()
        .and_then(|c| c.get(COOKIE_NAME).map(|s| s.to_owned()));

    let (key, is_new) = glob.sessions.open(cookie_value.as_deref()).await;
    req.extensions_mut().insert(SessionKey(key.clone()));

    let mut response = next.run(req).await;

    // A handler that moved the session to a new key leaves it here.
    let cookie_key = match response.extensions_mut().remove::<SessionKey>() {
        Some(SessionKey(rotated)) => Some(rotated),
        None if is_new => Some(key),
        None => None,
    };

    if let Some(key) = cookie_key {
        match HeaderValue::from_str(&glob.sessions.set_cookie(&key)) {
            Ok(v) => { response.headers_mut().append(header::SET_COOKIE, v); },
            Err(e) => {
                log::error!("Unable to produce session cookie header: {}", &e);
            },
        }
    }

    response
}

/// Middleware to bounce requests without a logged-in user to `/login`.
pub async fn require_login<B>(
    req: Request<B>,
    next: Next<B>
) -> Response {
    let (glob, key) = match (
        req.extensions().get::<Arc<Glob>>(),
        req.extensions().get::<SessionKey>(),
    ) {
        (Some(glob), Some(key)) => (glob.clone(), key.0.clone()),
        _ => {
            log::error!("require_login() missing Glob or SessionKey extension.");
            return html_500();
        },
    };

    if glob.sessions.user(&key).await.is_none() {
        log::trace!("Unauthenticated request for {}; redirecting.", req.uri());
        glob.sessions.flash(
            &key,
            Category::Warning,
            "You need to log in to access this page."
        ).await;
        return Redirect::to("/login").into_response();
    }

    next.run(req).await
}

/**
Numeric id taken from the single `:id` segment of a route. Anything that
isn't an integer gets the 404 page.
*/
#[derive(Clone, Copy, Debug)]
pub struct Id(pub i64);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Id {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = match axum::extract::Path::<String>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(raw)) => raw,
            Err(e) => {
                log::error!("Unable to extract id from {}: {}", &parts.uri, &e);
                return Err(serve_template(StatusCode::NOT_FOUND, "404", &json!({})));
            },
        };

        raw.parse().map(Id).map_err(|_| {
            log::debug!("Non-numeric id {:?} in {}.", &raw, &parts.uri);
            serve_template(StatusCode::NOT_FOUND, "404", &json!({}))
        })
    }
}

/**
Extractor giving a handler access to the global state and the session of
the current request.
*/
pub struct Visit {
    glob: Arc<Glob>,
    key: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Visit {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let glob = match parts.extensions.get::<Arc<Glob>>() {
            Some(glob) => glob.clone(),
            None => {
                log::error!("No Glob extension present extracting Visit.");
                return Err(html_500());
            },
        };
        let key = match parts.extensions.get::<SessionKey>() {
            Some(k) => k.0.clone(),
            None => {
                log::error!("No SessionKey extension present extracting Visit.");
                return Err(html_500());
            },
        };

        Ok(Visit { glob, key })
    }
}

impl Visit {
    pub fn store(&self) -> &dyn Repo {
        self.glob.store.as_ref()
    }

    pub fn session_key(&self) -> &str {
        &self.key
    }

    pub async fn user(&self) -> Option<SessionUser> {
        self.glob.sessions.user(&self.key).await
    }

    /**
    Log `user` in under a fresh session key, which becomes this `Visit`'s
    key. The handler must hand the returned key to `with_session_key()` so
    the client gets a cookie for it.
    */
    pub async fn log_in(&mut self, user: SessionUser) -> SessionKey {
        self.key = self.glob.sessions.rotate(&self.key).await;
        self.glob.sessions.log_in(&self.key, user).await;
        SessionKey(self.key.clone())
    }

    pub async fn log_out(&self) {
        self.glob.sessions.log_out(&self.key).await
    }

    pub async fn flash<S: Into<String>>(&self, category: Category, message: S) {
        self.glob.sessions.flash(&self.key, category, message).await
    }

    /// Render `template` with `data`, plus the pending flash messages and
    /// the logged-in user.
    pub async fn render_status(&self, code: StatusCode, template: &str, data: Value) -> Response {
        let flashes = self.glob.sessions.take_flashes(&self.key).await;
        let current_user = self.user().await;
        let data = merged(data, json!({
            "flashes": flashes,
            "current_user": current_user,
        }));

        serve_template(code, template, &data)
    }

    pub async fn render(&self, template: &str, data: Value) -> Response {
        self.render_status(StatusCode::OK, template, data).await
    }

    pub async fn not_found(&self) -> Response {
        self.render_status(StatusCode::NOT_FOUND, "404", json!({})).await
    }

    /// Response for when reading from the data store fails.
    pub fn db_failure(&self, e: DbError) -> Response {
        log::error!("Data store error: {}", &e);
        html_500()
    }

    /// Unwrap a store read, or produce the 500 response for its failure.
    pub fn loaded<T>(&self, r: Result<T, DbError>) -> Result<T, Response> {
        r.map_err(|e| self.db_failure(e))
    }

    /// Like `loaded()`, but a missing row becomes a 404.
    pub async fn found<T>(&self, r: Result<Option<T>, DbError>) -> Result<T, Response> {
        match r {
            Ok(Some(x)) => Ok(x),
            Ok(None) => Err(self.not_found().await),
            Err(e) => Err(self.db_failure(e)),
        }
    }
}

/// Map ids to display names, for filling in related rows in list pages.
pub fn names<'a, I>(pairs: I) -> HashMap<i64, String>
where
    I: IntoIterator<Item = (i64, &'a str)>
{
    pairs.into_iter().map(|(id, s)| (id, s.to_owned())).collect()
}

/// Attach a rotated session key to `response`; `session_layer()` turns it
/// into a cookie.
pub fn with_session_key(mut response: Response, key: SessionKey) -> Response {
    response.extensions_mut().insert(key);
    response
}

/// Redirect after a successful (or at least completed) form submission.
pub fn redirect(uri: &str) -> Response {
    Redirect::to(uri).into_response()
}

/// Build the application's `Router`.
pub fn router(glob: Arc<Glob>) -> Router {
    let static_dir = glob.static_dir.clone();

    let guarded = Router::new()
        .route("/", get(login::index))

        .route("/niveles_web", get(levels::list))
        .route("/nuevo_nivel_web", get(levels::new_form).post(levels::create))
        .route("/ver_nivel_web/:id", get(levels::view))
        .route("/editar_nivel_web/:id", get(levels::edit_form).post(levels::update))
        .route("/eliminar_nivel_web/:id", post(levels::delete))

        .route("/usuarios_web", get(users::list))
        .route("/nuevo_usuario_web", get(users::new_form).post(users::create))
        .route("/ver_usuario_web/:id", get(users::view))
        .route("/editar_usuario_web/:id", get(users::edit_form).post(users::update))
        .route("/eliminar_usuario_web/:id", post(users::delete))

        .route("/estudiantes_web", get(students::list))
        .route("/nuevo_estudiante_web", get(students::new_form).post(students::create))
        .route("/ver_estudiante_web/:id", get(students::view))
        .route("/editar_estudiante_web/:id", get(students::edit_form).post(students::update))
        .route("/eliminar_estudiante_web/:id", post(students::delete))

        .route("/profesores_web", get(teachers::list))
        .route("/nuevo_profesor_web", get(teachers::new_form).post(teachers::create))
        .route("/ver_profesor_web/:id", get(teachers::view))
        .route("/editar_profesor_web/:id", get(teachers::edit_form).post(teachers::update))
        .route("/eliminar_profesor_web/:id", post(teachers::delete))

        .route("/lecciones_web", get(lessons::list))
        .route("/nuevo_leccion_web", get(lessons::new_form).post(lessons::create))
        .route("/ver_leccion_web/:id", get(lessons::view))
        .route("/editar_leccion_web/:id", get(lessons::edit_form).post(lessons::update))
        .route("/eliminar_leccion_web/:id", post(lessons::delete))

        .route("/ejercicios_web", get(exercises::list))
        .route("/nuevo_ejercicio_web", get(exercises::new_form).post(exercises::create))
        .route("/ver_ejercicio_web/:id", get(exercises::view))
        .route("/editar_ejercicio_web/:id", get(exercises::edit_form).post(exercises::update))
        .route("/eliminar_ejercicio_web/:id", post(exercises::delete))

        .route("/responder_ejercicio_web/:id", post(progress::answer))
        .route("/progreso_web", get(progress::list))

        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .merge(guarded)
        .route("/login", get(login::login_form).post(login::login))
        .route("/logout", get(login::logout))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(middleware::from_fn(session_layer))
        .layer(Extension(glob))
}
