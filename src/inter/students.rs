/*!
Pages for managing `Student` profiles.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Date;

use super::*;
use crate::{
    session::Category,
    store::{ExerciseRepo, LevelRepo, ProgressRepo, StudentRepo, UserRepo},
    user::{Role, Student},
    DATE_FMT, DATETIME_FMT,
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StudentForm {
    pub user_id: String,
    pub level_id: String,
    /// `YYYY-MM-DD`, as sent by a date input.
    pub birth: String,
}

impl From<&Student> for StudentForm {
    fn from(s: &Student) -> Self {
        Self {
            user_id: s.user_id.to_string(),
            level_id: s.level_id.to_string(),
            birth: s.birth.format(DATE_FMT).unwrap_or_default(),
        }
    }
}

/// `id` is the profile being edited, if any.
async fn validate(
    store: &dyn Repo,
    form: &StudentForm,
    id: Option<i64>
) -> Result<Student, String> {
    let user_id = parse_id(&form.user_id).ok_or("Choose a user.")?;
    let level_id = parse_id(&form.level_id).ok_or("Choose a level.")?;
    let birth = blank_means_none(&form.birth).ok_or("Date of birth is required.")?;
    let birth = Date::parse(birth, DATE_FMT).map_err(|_| format!(
        "{:?} is not a valid date; use YYYY-MM-DD.", birth
    ))?;

    match store.user(user_id).await {
        Err(e) => { return Err(format!("Unable to look up user: {}", &e)); },
        Ok(None) => { return Err(format!("There is no user with id {}.", &user_id)); },
        Ok(Some(u)) if u.role != Role::Student => {
            return Err(format!("{} is not a student.", &u.name));
        },
        Ok(Some(_)) => {},
    }

    match store.level(level_id).await {
        Err(e) => { return Err(format!("Unable to look up level: {}", &e)); },
        Ok(None) => { return Err(format!("There is no level with id {}.", &level_id)); },
        Ok(Some(_)) => {},
    }

    match store.student_by_user(user_id).await {
        Err(e) => { return Err(format!("Unable to check student profiles: {}", &e)); },
        Ok(Some(s)) if Some(s.id) != id => {
            return Err("That user already has a student profile.".to_owned());
        },
        Ok(_) => {},
    }

    Ok(Student { id: id.unwrap_or(0), user_id, level_id, birth })
}

/// The choices for the form's selects, plus the form itself.
async fn form_data(
    visit: &Visit,
    form: &StudentForm,
    id: Option<i64>
) -> Result<Value, Response> {
    let users = visit.loaded(visit.store().users_with_role(Role::Student).await)?;
    let levels = visit.loaded(visit.store().levels().await)?;

    Ok(json!({
        "id": id,
        "form": form,
        "users": users,
        "levels": levels,
    }))
}

async fn render_form(
    visit: &Visit,
    template: &str,
    form: &StudentForm,
    id: Option<i64>
) -> Response {
    match form_data(visit, form, id).await {
        Ok(data) => visit.render(template, data).await,
        Err(r) => r,
    }
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("students::list() called.");

    let store = visit.store();
    let (students, users, levels) = match (
        visit.loaded(store.students().await),
        visit.loaded(store.users().await),
        visit.loaded(store.levels().await),
    ) {
        (Ok(s), Ok(u), Ok(l)) => (s, u, l),
        (Err(r), _, _) | (_, Err(r), _) | (_, _, Err(r)) => { return r; },
    };

    let user_names = names(users.iter().map(|u| (u.id, u.name.as_str())));
    let level_names = names(levels.iter().map(|l| (l.id, l.name.as_str())));

    let rows: Vec<Value> = students.iter().map(|s| json!({
        "student": s,
        "user_name": user_names.get(&s.user_id),
        "level_name": level_names.get(&s.level_id),
    })).collect();

    visit.render("estudiantes", json!({ "students": rows })).await
}

pub async fn new_form(visit: Visit) -> Response {
    render_form(&visit, "nuevo_estudiante", &StudentForm::default(), None).await
}

pub async fn create(visit: Visit, Form(form): Form<StudentForm>) -> Response {
    log::trace!("students::create( {:?} ) called.", &form);

    let student = match validate(visit.store(), &form, None).await {
        Ok(s) => s,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "nuevo_estudiante", &form, None).await;
        },
    };

    if let Err(e) = visit.store().insert_student(&student).await {
        log::error!("Error inserting student {:?}: {}", &student, &e);
        visit.flash(Category::Danger, format!("Unable to create student: {}", &e)).await;
        return render_form(&visit, "nuevo_estudiante", &form, None).await;
    }

    visit.flash(Category::Success, "Student created.").await;
    redirect("/estudiantes_web")
}

pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("students::view( {} ) called.", &id);

    let store = visit.store();
    let student = match visit.found(store.student(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let (user, level, progress, exercises) = match (
        visit.loaded(store.user(student.user_id).await),
        visit.loaded(store.level(student.level_id).await),
        visit.loaded(store.progress_by_student(id).await),
        visit.loaded(store.exercises().await),
    ) {
        (Ok(u), Ok(l), Ok(p), Ok(x)) => (u, l, p, x),
        (Err(r), _, _, _) | (_, Err(r), _, _)
        | (_, _, Err(r), _) | (_, _, _, Err(r)) => { return r; },
    };

    let questions = names(exercises.iter().map(|x| (x.id, x.question.as_str())));
    let progress: Vec<Value> = progress.iter().map(|p| json!({
        "progress": p,
        "question": questions.get(&p.exercise_id),
        "completed": p.completed.format(DATETIME_FMT).unwrap_or_default(),
        "passed": p.passed(),
    })).collect();

    visit.render("ver_estudiante", json!({
        "student": student,
        "user": user,
        "level": level,
        "progress": progress,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let student = match visit.found(visit.store().student(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    render_form(&visit, "editar_estudiante", &StudentForm::from(&student), Some(id)).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<StudentForm>
) -> Response {
    log::trace!("students::update( {}, {:?} ) called.", &id, &form);

    if let Err(r) = visit.found(visit.store().student(id).await).await {
        return r;
    }

    let student = match validate(visit.store(), &form, Some(id)).await {
        Ok(s) => s,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "editar_estudiante", &form, Some(id)).await;
        },
    };

    if let Err(e) = visit.store().update_student(&student).await {
        log::error!("Error updating student {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update student: {}", &e)).await;
        return render_form(&visit, "editar_estudiante", &form, Some(id)).await;
    }

    visit.flash(Category::Success, "Student updated.").await;
    redirect("/estudiantes_web")
}

pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("students::delete( {} ) called.", &id);

    if let Err(r) = visit.found(visit.store().student(id).await).await {
        return r;
    }

    match visit.store().delete_student(id).await {
        Ok(_) => {
            visit.flash(Category::Success, "Student deleted.").await;
        },
        Err(e) => {
            log::warn!("Unable to delete student {}: {}", &id, &e);
            visit.flash(Category::Danger, format!("Unable to delete student: {}", &e)).await;
        },
    }

    redirect("/estudiantes_web")
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::course::{Exercise, ExerciseKind};
    use crate::progress::Progress;
    use crate::user::NewUser;

    async fn student_user(store: &dyn Repo, name: &str, role: Role) -> i64 {
        store.insert_user(&NewUser {
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: String::new(),
            role,
        }).await.unwrap()
    }

    #[tokio::test]
    async fn one_student_profile_per_user() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lid = store.insert_level("A1").await.unwrap();
        let uid = student_user(store, "Lucia", Role::Student).await;
        let tid = student_user(store, "Pedro", Role::Teacher).await;

        let form = format!("user_id={}&level_id={}&birth=2008-03-14", uid, lid);
        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/estudiantes_web"));

        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("already has a student profile"));
        assert_eq!(store.students().await.unwrap().len(), 1);

        let form = format!("user_id={}&level_id={}&birth=2008-03-14", tid, lid);
        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("is not a student"));

        let resp = get_page(&app, "/estudiantes_web", Some(&cookie)).await;
        let body = body_string(resp).await;
        assert!(body.contains("Lucia"));
        assert!(body.contains("A1"));
    }

    #[tokio::test]
    async fn bad_dates_and_ids() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lid = store.insert_level("A1").await.unwrap();
        let uid = student_user(store, "Lucia", Role::Student).await;

        let form = format!("user_id={}&level_id={}&birth=14%2F03%2F2008", uid, lid);
        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("not a valid date"));

        let form = format!("user_id={}&level_id=&birth=2008-03-14", uid);
        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("Choose a level."));

        let form = format!("user_id={}&level_id=999&birth=2008-03-14", uid);
        let resp = post_form(&app, "/nuevo_estudiante_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("There is no level with id 999."));

        assert!(store.students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_student() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let a1 = store.insert_level("A1").await.unwrap();
        let a2 = store.insert_level("A2").await.unwrap();
        let uid = student_user(store, "Lucia", Role::Student).await;
        let sid = store.insert_student(&Student {
            id: 0,
            user_id: uid,
            level_id: a1,
            birth: Date::parse("2008-03-14", DATE_FMT).unwrap(),
        }).await.unwrap();

        let resp = get_page(&app, &format!("/editar_estudiante_web/{}", sid), Some(&cookie)).await;
        assert!(body_string(resp).await.contains("2008-03-14"));

        let form = format!("user_id={}&level_id={}&birth=2008-03-15", uid, a2);
        let uri = format!("/editar_estudiante_web/{}", sid);
        let resp = post_form(&app, &uri, Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/estudiantes_web"));

        let s = store.student(sid).await.unwrap().unwrap();
        assert_eq!(s.level_id, a2);
        assert_eq!(s.birth.day(), 15);
    }

    #[tokio::test]
    async fn view_shows_readable_progress_times() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lesson_id = super::super::exercises::tests::setup_lesson(store).await;
        let ex_id = store.insert_exercise(&Exercise {
            id: 0,
            lesson_id,
            question: "Past of 'go'?".to_owned(),
            kind: ExerciseKind::ShortAnswer,
            options: None,
            answer: "went".to_owned(),
        }).await.unwrap();
        let lid = store.insert_level("A1").await.unwrap();
        let uid = student_user(store, "Lucia", Role::Student).await;
        let sid = store.insert_student(&Student {
            id: 0,
            user_id: uid,
            level_id: lid,
            birth: Date::parse("2008-03-14", DATE_FMT).unwrap(),
        }).await.unwrap();
        store.insert_progress(&Progress {
            id: 0,
            student_id: sid,
            exercise_id: ex_id,
            completed: time::macros::datetime!(2024-05-06 07:08:09),
            score: Some(100),
            answer: Some("went".to_owned()),
        }).await.unwrap();

        let resp = get_page(&app, &format!("/ver_estudiante_web/{}", sid), Some(&cookie)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.contains("<td>2024-05-06 07:08</td>"));
        assert!(!body.contains("7:08:09"));
    }

    #[tokio::test]
    async fn delete_student_keeps_user() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lid = store.insert_level("A1").await.unwrap();
        let uid = student_user(store, "Lucia", Role::Student).await;
        let sid = store.insert_student(&Student {
            id: 0,
            user_id: uid,
            level_id: lid,
            birth: Date::parse("2008-03-14", DATE_FMT).unwrap(),
        }).await.unwrap();

        let uri = format!("/eliminar_estudiante_web/{}", sid);
        let resp = post_form(&app, &uri, Some(&cookie), "").await;
        assert_eq!(location(&resp), Some("/estudiantes_web"));

        assert!(store.student(sid).await.unwrap().is_none());
        assert!(store.user(uid).await.unwrap().is_some());
        // Only the profile goes; the level stays.
        assert!(store.level(lid).await.unwrap().is_some());

        let resp = get_page(&app, "/estudiantes_web", Some(&cookie)).await;
        let body = body_string(resp).await;
        assert!(body.contains("Student deleted."));

        let resp = post_form(&app, &uri, Some(&cookie), "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
