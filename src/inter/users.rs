/*!
Pages for managing `User`s.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::{
    session::Category,
    store::{StudentRepo, TeacherRepo, UserRepo},
    user::{hash_password, NewUser, Role, User},
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    /// Checkbox; present (as "on") when checked.
    pub active: String,
}

impl From<&User> for UserForm {
    fn from(u: &User) -> Self {
        Self {
            name: u.name.clone(),
            email: u.email.clone(),
            password: String::new(),
            role: u.role.as_str().to_owned(),
            active: if u.active { "on".to_owned() } else { String::new() },
        }
    }
}

/// Validated contents of a `UserForm`.
struct Fields {
    name: String,
    email: String,
    password: Option<String>,
    role: Role,
    active: bool,
}

/// `id` is the user being edited, if any; new users must supply a password.
async fn validate(
    store: &dyn Repo,
    form: &UserForm,
    id: Option<i64>
) -> Result<Fields, String> {
    let name = blank_means_none(&form.name).ok_or("Name is required.")?;
    let email = blank_means_none(&form.email).ok_or("Email is required.")?;
    let role: Role = blank_means_none(&form.role)
        .ok_or("Role is required.")?
        .parse()?;
    let password = match (form.password.as_str(), id) {
        ("", None) => { return Err("Password is required.".to_owned()); },
        ("", Some(_)) => None,
        (pwd, _) => Some(hash_password(pwd)?),
    };

    match store.user_by_email(email).await {
        Err(e) => {
            return Err(format!("Unable to check existing emails: {}", &e));
        },
        Ok(Some(u)) if Some(u.id) != id => {
            return Err(format!("The email {:?} is already registered.", email));
        },
        Ok(_) => {},
    }

    Ok(Fields {
        name: name.to_owned(),
        email: email.to_owned(),
        password,
        role,
        active: !form.active.is_empty(),
    })
}

fn form_data(form: &UserForm, id: Option<i64>) -> Value {
    json!({
        "id": id,
        "form": form,
        "roles": Role::ALL,
    })
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("users::list() called.");

    let users = match visit.loaded(visit.store().users().await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("usuarios", json!({ "users": users })).await
}

pub async fn new_form(visit: Visit) -> Response {
    let form = UserForm {
        role: Role::Student.as_str().to_owned(),
        active: "on".to_owned(),
        ..Default::default()
    };
    visit.render("nuevo_usuario", form_data(&form, None)).await
}

pub async fn create(visit: Visit, Form(form): Form<UserForm>) -> Response {
    log::trace!("users::create( {:?}, {:?} ) called.", &form.email, &form.role);

    let f = match validate(visit.store(), &form, None).await {
        Ok(f) => f,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return visit.render("nuevo_usuario", form_data(&form, None)).await;
        },
    };

    let new = NewUser {
        name: f.name,
        email: f.email,
        password_hash: f.password.unwrap_or_default(),
        role: f.role,
    };

    if let Err(e) = visit.store().insert_user(&new).await {
        log::error!("Error inserting user {:?}: {}", &new.email, &e);
        visit.flash(Category::Danger, format!("Unable to create user: {}", &e)).await;
        return visit.render("nuevo_usuario", form_data(&form, None)).await;
    }

    visit.flash(Category::Success, format!("User {:?} created.", &new.name)).await;
    redirect("/usuarios_web")
}

pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("users::view( {} ) called.", &id);

    let user = match visit.found(visit.store().user(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let student = match visit.loaded(visit.store().student_by_user(id).await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let teacher = match visit.loaded(visit.store().teacher_by_user(id).await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("ver_usuario", json!({
        "user": user,
        "student": student,
        "teacher": teacher,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let user = match visit.found(visit.store().user(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("editar_usuario", form_data(&UserForm::from(&user), Some(id))).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<UserForm>
) -> Response {
    log::trace!("users::update( {}, {:?} ) called.", &id, &form.email);

    let mut user = match visit.found(visit.store().user(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    let f = match validate(visit.store(), &form, Some(id)).await {
        Ok(f) => f,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return visit.render("editar_usuario", form_data(&form, Some(id))).await;
        },
    };

    user.name = f.name;
    user.email = f.email;
    user.role = f.role;
    user.active = f.active;
    if let Some(hash) = f.password {
        user.password_hash = hash;
    }

    if let Err(e) = visit.store().update_user(&user).await {
        log::error!("Error updating user {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update user: {}", &e)).await;
        return visit.render("editar_usuario", form_data(&form, Some(id))).await;
    }

    visit.flash(Category::Success, format!("User {:?} updated.", &user.name)).await;
    redirect("/usuarios_web")
}

pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("users::delete( {} ) called.", &id);

    let user = match visit.found(visit.store().user(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    if visit.user().await.map(|u| u.id) == Some(id) {
        visit.flash(Category::Warning, "You can't delete your own account.").await;
        return redirect("/usuarios_web");
    }

    match visit.store().delete_user(id).await {
        Ok(_) => {
            visit.flash(Category::Success, format!("User {:?} deleted.", &user.name)).await;
        },
        Err(e) => {
            log::warn!("Unable to delete user {}: {}", &id, &e);
            visit.flash(
                Category::Danger,
                format!("Unable to delete user {:?}: {}", &user.name, &e)
            ).await;
        },
    }

    redirect("/usuarios_web")
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;

    #[tokio::test]
    async fn create_and_edit_user() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let form = "name=Ana+L%C3%B3pez&email=ana%40example.com&password=secreta&role=student&active=on";
        let resp = post_form(&app, "/nuevo_usuario_web", Some(&cookie), form).await;
        assert_eq!(location(&resp), Some("/usuarios_web"));

        let ana = store.user_by_email("ana@example.com").await.unwrap().unwrap();
        assert_eq!(&ana.name, "Ana López");
        assert_eq!(ana.role, Role::Student);
        assert!(ana.check_password("secreta"));
        assert_ne!(&ana.password_hash, "secreta");

        // Same email again.
        let resp = post_form(&app, "/nuevo_usuario_web", Some(&cookie), form).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("already registered"));

        // Bad role.
        let bad = "name=X&email=x%40example.com&password=p&role=janitor";
        let resp = post_form(&app, "/nuevo_usuario_web", Some(&cookie), bad).await;
        assert!(body_string(resp).await.contains("not a valid Role"));
        assert!(store.user_by_email("x@example.com").await.unwrap().is_none());

        // Edit without a password keeps the old one.
        let uri = format!("/editar_usuario_web/{}", ana.id);
        let edit = "name=Ana+L%C3%B3pez&email=ana%40example.com&password=&role=teacher";
        let resp = post_form(&app, &uri, Some(&cookie), edit).await;
        assert_eq!(location(&resp), Some("/usuarios_web"));
        let ana = store.user(ana.id).await.unwrap().unwrap();
        assert_eq!(ana.role, Role::Teacher);
        assert!(!ana.active);
        assert!(ana.check_password("secreta"));

        // Edit with one re-hashes it.
        let edit = "name=Ana&email=ana%40example.com&password=nueva&role=teacher&active=on";
        post_form(&app, &uri, Some(&cookie), edit).await;
        let ana = store.user(ana.id).await.unwrap().unwrap();
        assert!(ana.check_password("nueva"));
        assert!(ana.active);

        // Taking the admin's email is refused.
        let edit = format!("name=Ana&email={}&role=teacher", ADMIN_EMAIL.replace('@', "%40"));
        let resp = post_form(&app, &uri, Some(&cookie), &edit).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&store.user(ana.id).await.unwrap().unwrap().email, "ana@example.com");
    }

    #[tokio::test]
    async fn cannot_delete_self() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let admin = glob.store.user_by_email(ADMIN_EMAIL).await.unwrap().unwrap();

        let uri = format!("/eliminar_usuario_web/{}", admin.id);
        let resp = post_form(&app, &uri, Some(&cookie), "").await;
        assert_eq!(location(&resp), Some("/usuarios_web"));
        assert!(glob.store.user(admin.id).await.unwrap().is_some());
    }
}
