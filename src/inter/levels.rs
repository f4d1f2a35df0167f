/*!
Pages for managing `Level`s.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::{
    course::Level,
    session::Category,
    store::{LessonRepo, LevelRepo},
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LevelForm {
    pub name: String,
}

impl From<&Level> for LevelForm {
    fn from(l: &Level) -> Self {
        Self { name: l.name.clone() }
    }
}

/// Check the submitted form, returning the cleaned-up name. `id` is the
/// level being edited, if any. `Err` carries the message to flash.
async fn validate(
    store: &dyn Repo,
    form: &LevelForm,
    id: Option<i64>
) -> Result<String, String> {
    let name = blank_means_none(&form.name).ok_or("Level name is required.")?;

    match store.level_by_name(name).await {
        Err(e) => Err(format!("Unable to check existing level names: {}", &e)),
        Ok(Some(l)) if Some(l.id) != id => Err(format!(
            "A level named {:?} already exists.", name
        )),
        Ok(_) => Ok(name.to_owned()),
    }
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("levels::list() called.");

    let levels = match visit.loaded(visit.store().levels().await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("niveles", json!({ "levels": levels })).await
}

pub async fn new_form(visit: Visit) -> Response {
    visit.render("nuevo_nivel", json!({ "form": LevelForm::default() })).await
}

pub async fn create(visit: Visit, Form(form): Form<LevelForm>) -> Response {
    log::trace!("levels::create( {:?} ) called.", &form);

    let name = match validate(visit.store(), &form, None).await {
        Ok(name) => name,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return visit.render("nuevo_nivel", json!({ "form": &form })).await;
        },
    };

    if let Err(e) = visit.store().insert_level(&name).await {
        log::error!("Error inserting level {:?}: {}", &name, &e);
        visit.flash(Category::Danger, format!("Unable to create level: {}", &e)).await;
        return visit.render("nuevo_nivel", json!({ "form": &form })).await;
    }

    visit.flash(Category::Success, format!("Level {:?} created.", &name)).await;
    redirect("/niveles_web")
}

pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("levels::view( {} ) called.", &id);

    let level = match visit.found(visit.store().level(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let lessons = match visit.loaded(visit.store().lessons_by_level(id).await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("ver_nivel", json!({
        "level": level,
        "lessons": lessons,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let level = match visit.found(visit.store().level(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render("editar_nivel", json!({
        "id": level.id,
        "form": LevelForm::from(&level),
    })).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<LevelForm>
) -> Response {
    log::trace!("levels::update( {}, {:?} ) called.", &id, &form);

    let mut level = match visit.found(visit.store().level(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    level.name = match validate(visit.store(), &form, Some(id)).await {
        Ok(name) => name,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return visit.render("editar_nivel", json!({ "id": id, "form": &form })).await;
        },
    };

    if let Err(e) = visit.store().update_level(&level).await {
        log::error!("Error updating level {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update level: {}", &e)).await;
        return visit.render("editar_nivel", json!({ "id": id, "form": &form })).await;
    }

    visit.flash(Category::Success, format!("Level {:?} updated.", &level.name)).await;
    redirect("/niveles_web")
}

pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("levels::delete( {} ) called.", &id);

    let level = match visit.found(visit.store().level(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    match visit.store().delete_level(id).await {
        Ok(_) => {
            visit.flash(Category::Success, format!("Level {:?} deleted.", &level.name)).await;
        },
        Err(e) => {
            log::warn!("Unable to delete level {}: {}", &id, &e);
            visit.flash(
                Category::Danger,
                format!("Unable to delete level {:?}: {}", &level.name, &e)
            ).await;
        },
    }

    redirect("/niveles_web")
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::course::Lesson;
    use crate::store::{TeacherRepo, UserRepo};
    use crate::user::{NewUser, Role, Teacher};

    #[tokio::test]
    async fn duplicate_level_rejected() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;

        let resp = post_form(&app, "/nuevo_nivel_web", Some(&cookie), "name=Principiante").await;
        assert_eq!(location(&resp), Some("/niveles_web"));

        let resp = post_form(&app, "/nuevo_nivel_web", Some(&cookie), "name=+Principiante+").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("already exists"));

        let resp = post_form(&app, "/nuevo_nivel_web", Some(&cookie), "name=").await;
        assert!(body_string(resp).await.contains("Level name is required."));

        assert_eq!(glob.store.levels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_level() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let a = glob.store.insert_level("A1").await.unwrap();
        glob.store.insert_level("A2").await.unwrap();

        // Keeping its own name is fine.
        let uri = format!("/editar_nivel_web/{}", a);
        let resp = post_form(&app, &uri, Some(&cookie), "name=A1").await;
        assert_eq!(location(&resp), Some("/niveles_web"));

        let resp = post_form(&app, &uri, Some(&cookie), "name=A2").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&glob.store.level(a).await.unwrap().unwrap().name, "A1");

        let resp = post_form(&app, &uri, Some(&cookie), "name=B1").await;
        assert_eq!(location(&resp), Some("/niveles_web"));
        assert_eq!(&glob.store.level(a).await.unwrap().unwrap().name, "B1");

        let resp = get_page(&app, "/editar_nivel_web/999", Some(&cookie)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_level_keeps_lessons() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lid = store.insert_level("C1").await.unwrap();
        let uid = store.insert_user(&NewUser {
            name: "Marta".to_owned(),
            email: "marta@example.com".to_owned(),
            password_hash: String::new(),
            role: Role::Teacher,
        }).await.unwrap();
        let tid = store.insert_teacher(&Teacher {
            id: 0, user_id: uid, subject: "Inglés".to_owned(), level_id: Some(lid),
        }).await.unwrap();
        let lesson_id = store.insert_lesson(&Lesson {
            id: 0,
            teacher_id: tid,
            title: "Phrasal verbs".to_owned(),
            content: "Look up, look after.".to_owned(),
            video: None,
            level_id: Some(lid),
        }).await.unwrap();

        let resp = get_page(&app, &format!("/ver_nivel_web/{}", lid), Some(&cookie)).await;
        assert!(body_string(resp).await.contains("Phrasal verbs"));

        let resp = post_form(&app, &format!("/eliminar_nivel_web/{}", lid), Some(&cookie), "").await;
        assert_eq!(location(&resp), Some("/niveles_web"));

        assert!(store.level(lid).await.unwrap().is_none());
        let lesson = store.lesson(lesson_id).await.unwrap().unwrap();
        assert_eq!(lesson.level_id, None);

        let resp = post_form(&app, &format!("/eliminar_nivel_web/{}", lid), Some(&cookie), "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
