/*!
Pages for managing `Teacher` profiles.
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
    store::{LessonRepo, LevelRepo, TeacherRepo, UserRepo},
    user::{Role, Teacher},
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TeacherForm {
    pub user_id: String,
    pub subject: String,
    /// Optional; blank means no level.
    pub level_id: String,
}

impl From<&Teacher> for TeacherForm {
    fn from(t: &Teacher) -> Self {
        Self {
            user_id: t.user_id.to_string(),
            subject: t.subject.clone(),
            level_id: t.level_id.map(|n| n.to_string()).unwrap_or_default(),
        }
    }
}

async fn validate(
    store: &dyn Repo,
    form: &TeacherForm,
    id: Option<i64>
) -> Result<Teacher, String> {
    let user_id = parse_id(&form.user_id).ok_or("Choose a user.")?;
    let subject = blank_means_none(&form.subject).ok_or("Subject is required.")?;
    let level_id = match blank_means_none(&form.level_id) {
        None => None,
        Some(s) => Some(s.parse::<i64>().map_err(|_| format!(
            "{:?} is not a valid level id.", s
        ))?),
    };

    match store.user(user_id).await {
        Err(e) => { return Err(format!("Unable to look up user: {}", &e)); },
        Ok(None) => { return Err(format!("There is no user with id {}.", &user_id)); },
        Ok(Some(u)) if u.role != Role::Teacher => {
            return Err(format!("{} is not a teacher.", &u.name));
        },
        Ok(Some(_)) => {},
    }

    if let Some(level_id) = level_id {
        match store.level(level_id).await {
            Err(e) => { return Err(format!("Unable to look up level: {}", &e)); },
            Ok(None) => { return Err(format!("There is no level with id {}.", &level_id)); },
            Ok(Some(_)) => {},
        }
    }

    match store.teacher_by_user(user_id).await {
        Err(e) => { return Err(format!("Unable to check teacher profiles: {}", &e)); },
        Ok(Some(t)) if Some(t.id) != id => {
            return Err("That user already has a teacher profile.".to_owned());
        },
        Ok(_) => {},
    }

    Ok(Teacher {
        id: id.unwrap_or(0),
        user_id,
        subject: subject.to_owned(),
        level_id,
    })
}

async fn render_form(
    visit: &Visit,
    template: &str,
    form: &TeacherForm,
    id: Option<i64>
) -> Response {
    let store = visit.store();
    let (users, levels) = match (
        visit.loaded(store.users_with_role(Role::Teacher).await),
        visit.loaded(store.levels().await),
    ) {
        (Ok(u), Ok(l)) => (u, l),
        (Err(r), _) | (_, Err(r)) => { return r; },
    };

    visit.render(template, json!({
        "id": id,
        "form": form,
        "users": users,
        "levels": levels,
    })).await
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("teachers::list() called.");

    let store = visit.store();
    let (teachers, users, levels) = match (
        visit.loaded(store.teachers().await),
        visit.loaded(store.users().await),
        visit.loaded(store.levels().await),
    ) {
        (Ok(t), Ok(u), Ok(l)) => (t, u, l),
        (Err(r), _, _) | (_, Err(r), _) | (_, _, Err(r)) => { return r; },
    };

    let user_names = names(users.iter().map(|u| (u.id, u.name.as_str())));
    let level_names = names(levels.iter().map(|l| (l.id, l.name.as_str())));

    let rows: Vec<Value> = teachers.iter().map(|t| json!({
        "teacher": t,
        "user_name": user_names.get(&t.user_id),
        "level_name": t.level_id.and_then(|n| level_names.get(&n)),
    })).collect();

    visit.render("profesores", json!({ "teachers": rows })).await
}

pub async fn new_form(visit: Visit) -> Response {
    render_form(&visit, "nuevo_profesor", &TeacherForm::default(), None).await
}

pub async fn create(visit: Visit, Form(form): Form<TeacherForm>) -> Response {
    log::trace!("teachers::create( {:?} ) called.", &form);

    let teacher = match validate(visit.store(), &form, None).await {
        Ok(t) => t,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "nuevo_profesor", &form, None).await;
        },
    };

    if let Err(e) = visit.store().insert_teacher(&teacher).await {
        log::error!("Error inserting teacher {:?}: {}", &teacher, &e);
        visit.flash(Category::Danger, format!("Unable to create teacher: {}", &e)).await;
        return render_form(&visit, "nuevo_profesor", &form, None).await;
    }

    visit.flash(Category::Success, "Teacher created.").await;
    redirect("/profesores_web")
}

pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("teachers::view( {} ) called.", &id);

    let store = visit.store();
    let teacher = match visit.found(store.teacher(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let level = match teacher.level_id {
        None => Ok(None),
        Some(n) => visit.loaded(store.level(n).await),
    };
    let (user, level, lessons) = match (
        visit.loaded(store.user(teacher.user_id).await),
        level,
        visit.loaded(store.lessons_by_teacher(id).await),
    ) {
        (Ok(u), Ok(l), Ok(x)) => (u, l, x),
        (Err(r), _, _) | (_, Err(r), _) | (_, _, Err(r)) => { return r; },
    };

    visit.render("ver_profesor", json!({
        "teacher": teacher,
        "user": user,
        "level": level,
        "lessons": lessons,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let teacher = match visit.found(visit.store().teacher(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    render_form(&visit, "editar_profesor", &TeacherForm::from(&teacher), Some(id)).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<TeacherForm>
) -> Response {
    log::trace!("teachers::update( {}, {:?} ) called.", &id, &form);

    if let Err(r) = visit.found(visit.store().teacher(id).await).await {
        return r;
    }

    let teacher = match validate(visit.store(), &form, Some(id)).await {
        Ok(t) => t,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "editar_profesor", &form, Some(id)).await;
        },
    };

    if let Err(e) = visit.store().update_teacher(&teacher).await {
        log::error!("Error updating teacher {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update teacher: {}", &e)).await;
        return render_form(&visit, "editar_profesor", &form, Some(id)).await;
    }

    visit.flash(Category::Success, "Teacher updated.").await;
    redirect("/profesores_web")
}

/// Also removes the teacher's lessons and their exercises.
pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("teachers::delete( {} ) called.", &id);

    if let Err(r) = visit.found(visit.store().teacher(id).await).await {
        return r;
    }

    match visit.store().delete_teacher(id).await {
        Ok(_) => {
            visit.flash(Category::Success, "Teacher and their lessons deleted.").await;
        },
        Err(e) => {
            log::warn!("Unable to delete teacher {}: {}", &id, &e);
            visit.flash(Category::Danger, format!("Unable to delete teacher: {}", &e)).await;
        },
    }

    redirect("/profesores_web")
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::course::{Exercise, ExerciseKind, Lesson};
    use crate::store::ExerciseRepo;
    use crate::user::NewUser;

    async fn teacher_user(store: &dyn Repo, name: &str) -> i64 {
        store.insert_user(&NewUser {
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: String::new(),
            role: Role::Teacher,
        }).await.unwrap()
    }

    #[tokio::test]
    async fn create_teacher() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();
        let uid = teacher_user(store, "Pedro").await;

        // Level is optional.
        let form = format!("user_id={}&subject=Franc%C3%A9s&level_id=", uid);
        let resp = post_form(&app, "/nuevo_profesor_web", Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/profesores_web"));

        let t = store.teacher_by_user(uid).await.unwrap().unwrap();
        assert_eq!(&t.subject, "Francés");
        assert_eq!(t.level_id, None);

        let resp = post_form(&app, "/nuevo_profesor_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("already has a teacher profile"));

        let form = format!("user_id={}&subject=", uid);
        let resp = post_form(&app, "/nuevo_profesor_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("Subject is required."));

        assert_eq!(store.teachers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_teacher_cascades() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let uid = teacher_user(store, "Pedro").await;
        let tid = store.insert_teacher(&Teacher {
            id: 0, user_id: uid, subject: "Inglés".to_owned(), level_id: None,
        }).await.unwrap();
        let lesson_id = store.insert_lesson(&Lesson {
            id: 0,
            teacher_id: tid,
            title: "Past simple".to_owned(),
            content: "Regular verbs take -ed.".to_owned(),
            video: None,
            level_id: None,
        }).await.unwrap();
        let ex_id = store.insert_exercise(&Exercise {
            id: 0,
            lesson_id,
            question: "Past of 'walk'?".to_owned(),
            kind: ExerciseKind::ShortAnswer,
            options: None,
            answer: "walked".to_owned(),
        }).await.unwrap();

        let resp = get_page(&app, &format!("/ver_profesor_web/{}", tid), Some(&cookie)).await;
        assert!(body_string(resp).await.contains("Past simple"));

        let uri = format!("/eliminar_profesor_web/{}", tid);
        let resp = post_form(&app, &uri, Some(&cookie), "").await;
        assert_eq!(location(&resp), Some("/profesores_web"));

        assert!(store.teacher(tid).await.unwrap().is_none());
        assert!(store.lesson(lesson_id).await.unwrap().is_none());
        assert!(store.exercise(ex_id).await.unwrap().is_none());
        // The user account itself stays.
        assert!(store.user(uid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn edit_teacher() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let uid = teacher_user(store, "Pedro").await;
        let lid = store.insert_level("B2").await.unwrap();
        let tid = store.insert_teacher(&Teacher {
            id: 0, user_id: uid, subject: "Inglés".to_owned(), level_id: None,
        }).await.unwrap();

        let resp = get_page(&app, &format!("/editar_profesor_web/{}", tid), Some(&cookie)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("Inglés"));

        // Keeping the same user is not a second profile.
        let uri = format!("/editar_profesor_web/{}", tid);
        let form = format!("user_id={}&subject=Alem%C3%A1n&level_id={}", uid, lid);
        let resp = post_form(&app, &uri, Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/profesores_web"));

        let t = store.teacher(tid).await.unwrap().unwrap();
        assert_eq!(&t.subject, "Alemán");
        assert_eq!(t.level_id, Some(lid));

        let form = format!("user_id={}&subject=Alem%C3%A1n&level_id=999", uid);
        let resp = post_form(&app, &uri, Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("There is no level with id 999."));
        assert_eq!(store.teacher(tid).await.unwrap().unwrap().level_id, Some(lid));
    }
}
