/*!
Logging in and out, and the landing page.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::{
    session::{Category, SessionUser},
    store::{ExerciseRepo, LessonRepo, LevelRepo, UserRepo},
    user::Role,
};

static BAD_LOGIN: &str = "Invalid email or password.";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Where each role lands after logging in.
fn landing_page(role: Role) -> &'static str {
    match role {
        Role::Admin   => "/usuarios_web",
        Role::Teacher => "/lecciones_web",
        Role::Student => "/",
    }
}

pub async fn login_form(visit: Visit) -> Response {
    visit.render("login", json!({ "form": LoginForm::default() })).await
}

pub async fn login(mut visit: Visit, Form(form): Form<LoginForm>) -> Response {
    log::trace!("login::login( {:?} ) called.", &form.email);

    let email = form.email.trim();
    let u = match visit.store().user_by_email(email).await {
        Ok(u) => u,
        Err(e) => {
            log::error!("Error looking up user {:?} to log in: {}", email, &e);
            visit.flash(Category::Danger, "Unable to log in right now; please try again.").await;
            return visit.render("login", json!({ "form": &form })).await;
        },
    };

    let u = match u {
        Some(u) if u.active && u.check_password(&form.password) => u,
        Some(u) if !u.active => {
            log::info!("Login attempt by inactive user {:?}.", &u.email);
            visit.flash(Category::Danger, BAD_LOGIN).await;
            return visit.render("login", json!({ "form": &form })).await;
        },
        _ => {
            log::info!("Failed login attempt for {:?}.", email);
            visit.flash(Category::Danger, BAD_LOGIN).await;
            return visit.render("login", json!({ "form": &form })).await;
        },
    };

    log::info!("User {:?} ({}) logged in.", &u.email, &u.role);
    let key = visit.log_in(SessionUser {
        id: u.id,
        email: u.email.clone(),
        role: u.role,
    }).await;
    visit.flash(Category::Success, format!("Welcome, {}.", &u.name)).await;

    with_session_key(redirect(landing_page(u.role)), key)
}

pub async fn logout(visit: Visit) -> Response {
    if let Some(u) = visit.user().await {
        log::info!("User {:?} logged out.", &u.email);
    }
    visit.log_out().await;
    visit.flash(Category::Info, "You have been logged out.").await;
    redirect("/login")
}

pub async fn index(visit: Visit) -> Response {
    log::trace!("login::index() called.");

    let store = visit.store();
    let counts = (
        store.levels().await,
        store.lessons().await,
        store.exercises().await,
    );
    let (levels, lessons, exercises) = match counts {
        (Ok(a), Ok(b), Ok(c)) => (a.len(), b.len(), c.len()),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            return visit.db_failure(e);
        },
    };

    visit.render("index", json!({
        "n_levels": levels,
        "n_lessons": lessons,
        "n_exercises": exercises,
    })).await
}
