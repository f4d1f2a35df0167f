/*!
Pages for managing `Lesson`s.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::{
    course::Lesson,
    session::Category,
    store::{ExerciseRepo, LessonRepo, LevelRepo, TeacherRepo, UserRepo},
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LessonForm {
    pub teacher_id: String,
    pub title: String,
    pub content: String,
    pub video: String,
    pub level_id: String,
}

impl From<&Lesson> for LessonForm {
    fn from(l: &Lesson) -> Self {
        Self {
            teacher_id: l.teacher_id.to_string(),
            title: l.title.clone(),
            content: l.content.clone(),
            video: l.video.clone().unwrap_or_default(),
            level_id: l.level_id.map(|n| n.to_string()).unwrap_or_default(),
        }
    }
}

async fn validate(
    store: &dyn Repo,
    form: &LessonForm,
    id: Option<i64>
) -> Result<Lesson, String> {
    let teacher_id = parse_id(&form.teacher_id).ok_or("Choose a teacher.")?;
    let title = blank_means_none(&form.title).ok_or("Title is required.")?;
    let content = blank_means_none(&form.content).ok_or("Content is required.")?;
    let level_id = match blank_means_none(&form.level_id) {
        None => None,
        Some(s) => Some(s.parse::<i64>().map_err(|_| format!(
            "{:?} is not a valid level id.", s
        ))?),
    };

    match store.teacher(teacher_id).await {
        Err(e) => { return Err(format!("Unable to look up teacher: {}", &e)); },
        Ok(None) => { return Err(format!("There is no teacher with id {}.", &teacher_id)); },
        Ok(Some(_)) => {},
    }

    if let Some(level_id) = level_id {
        match store.level(level_id).await {
            Err(e) => { return Err(format!("Unable to look up level: {}", &e)); },
            Ok(None) => { return Err(format!("There is no level with id {}.", &level_id)); },
            Ok(Some(_)) => {},
        }
    }

    Ok(Lesson {
        id: id.unwrap_or(0),
        teacher_id,
        title: title.to_owned(),
        content: content.to_owned(),
        video: blank_means_none(&form.video).map(|s| s.to_owned()),
        level_id,
    })
}

/// Teachers paired with their users' names, for the form's select.
async fn teacher_choices(visit: &Visit) -> Result<Vec<Value>, Response> {
    let store = visit.store();
    let teachers = visit.loaded(store.teachers().await)?;
    let users = visit.loaded(store.users().await)?;
    let user_names = names(users.iter().map(|u| (u.id, u.name.as_str())));

    Ok(teachers.iter().map(|t| json!({
        "id": t.id,
        "name": user_names.get(&t.user_id),
        "subject": &t.subject,
    })).collect())
}

async fn render_form(
    visit: &Visit,
    template: &str,
    form: &LessonForm,
    id: Option<i64>
) -> Response {
    let (teachers, levels) = match (
        teacher_choices(visit).await,
        visit.loaded(visit.store().levels().await),
    ) {
        (Ok(t), Ok(l)) => (t, l),
        (Err(r), _) | (_, Err(r)) => { return r; },
    };

    visit.render(template, json!({
        "id": id,
        "form": form,
        "teachers": teachers,
        "levels": levels,
    })).await
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("lessons::list() called.");

    let store = visit.store();
    let (lessons, teachers, users, levels) = match (
        visit.loaded(store.lessons().await),
        visit.loaded(store.teachers().await),
        visit.loaded(store.users().await),
        visit.loaded(store.levels().await),
    ) {
        (Ok(x), Ok(t), Ok(u), Ok(l)) => (x, t, u, l),
        (Err(r), _, _, _) | (_, Err(r), _, _)
        | (_, _, Err(r), _) | (_, _, _, Err(r)) => { return r; },
    };

    let user_names = names(users.iter().map(|u| (u.id, u.name.as_str())));
    let teacher_names: HashMap<i64, &String> = teachers.iter()
        .filter_map(|t| user_names.get(&t.user_id).map(|name| (t.id, name)))
        .collect();
    let level_names = names(levels.iter().map(|l| (l.id, l.name.as_str())));

    let rows: Vec<Value> = lessons.iter().map(|l| json!({
        "lesson": l,
        "teacher_name": teacher_names.get(&l.teacher_id),
        "level_name": l.level_id.and_then(|n| level_names.get(&n)),
    })).collect();

    visit.render("lecciones", json!({ "lessons": rows })).await
}

pub async fn new_form(visit: Visit) -> Response {
    let mut form = LessonForm::default();

    // A teacher adding a lesson is most likely adding one of their own.
    if let Some(u) = visit.user().await {
        if let Ok(Some(t)) = visit.store().teacher_by_user(u.id).await {
            form.teacher_id = t.id.to_string();
        }
    }

    render_form(&visit, "nuevo_leccion", &form, None).await
}

pub async fn create(visit: Visit, Form(form): Form<LessonForm>) -> Response {
    log::trace!("lessons::create( {:?} ) called.", &form.title);

    let lesson = match validate(visit.store(), &form, None).await {
        Ok(l) => l,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "nuevo_leccion", &form, None).await;
        },
    };

    if let Err(e) = visit.store().insert_lesson(&lesson).await {
        log::error!("Error inserting lesson {:?}: {}", &lesson.title, &e);
        visit.flash(Category::Danger, format!("Unable to create lesson: {}", &e)).await;
        return render_form(&visit, "nuevo_leccion", &form, None).await;
    }

    visit.flash(Category::Success, format!("Lesson {:?} created.", &lesson.title)).await;
    redirect("/lecciones_web")
}

pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("lessons::view( {} ) called.", &id);

    let store = visit.store();
    let lesson = match visit.found(store.lesson(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let level = match lesson.level_id {
        None => Ok(None),
        Some(n) => visit.loaded(store.level(n).await),
    };
    let (teacher, level, exercises) = match (
        visit.loaded(store.teacher(lesson.teacher_id).await),
        level,
        visit.loaded(store.exercises_by_lesson(id).await),
    ) {
        (Ok(t), Ok(l), Ok(x)) => (t, l, x),
        (Err(r), _, _) | (_, Err(r), _) | (_, _, Err(r)) => { return r; },
    };
    let teacher_name = match &teacher {
        None => None,
        Some(t) => match visit.loaded(store.user(t.user_id).await) {
            Ok(u) => u.map(|u| u.name),
            Err(r) => { return r; },
        },
    };

    visit.render("ver_leccion", json!({
        "lesson": lesson,
        "teacher": teacher,
        "teacher_name": teacher_name,
        "level": level,
        "exercises": exercises,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let lesson = match visit.found(visit.store().lesson(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    render_form(&visit, "editar_leccion", &LessonForm::from(&lesson), Some(id)).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<LessonForm>
) -> Response {
    log::trace!("lessons::update( {}, {:?} ) called.", &id, &form.title);

    if let Err(r) = visit.found(visit.store().lesson(id).await).await {
        return r;
    }

    let lesson = match validate(visit.store(), &form, Some(id)).await {
        Ok(l) => l,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "editar_leccion", &form, Some(id)).await;
        },
    };

    if let Err(e) = visit.store().update_lesson(&lesson).await {
        log::error!("Error updating lesson {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update lesson: {}", &e)).await;
        return render_form(&visit, "editar_leccion", &form, Some(id)).await;
    }

    visit.flash(Category::Success, format!("Lesson {:?} updated.", &lesson.title)).await;
    redirect("/lecciones_web")
}

/// Also removes the lesson's exercises.
pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("lessons::delete( {} ) called.", &id);

    let lesson = match visit.found(visit.store().lesson(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    match visit.store().delete_lesson(id).await {
        Ok(_) => {
            visit.flash(Category::Success, format!("Lesson {:?} deleted.", &lesson.title)).await;
        },
        Err(e) => {
            log::warn!("Unable to delete lesson {}: {}", &id, &e);
            visit.flash(Category::Danger, format!("Unable to delete lesson: {}", &e)).await;
        },
    }

    redirect("/lecciones_web")
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::course::{Exercise, ExerciseKind};
    use crate::user::{NewUser, Role, Teacher};

    async fn setup_teacher(store: &dyn Repo) -> i64 {
        let uid = store.insert_user(&NewUser {
            name: "Pedro".to_owned(),
            email: "pedro@example.com".to_owned(),
            password_hash: String::new(),
            role: Role::Teacher,
        }).await.unwrap();
        store.insert_teacher(&Teacher {
            id: 0, user_id: uid, subject: "Inglés".to_owned(), level_id: None,
        }).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_edit_lesson() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();
        let tid = setup_teacher(store).await;
        let lid = store.insert_level("B1").await.unwrap();

        let form = format!(
            "teacher_id={}&title=Conditionals&content=If+I+were...&video=&level_id={}",
            tid, lid
        );
        let resp = post_form(&app, "/nuevo_leccion_web", Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/lecciones_web"));

        let lesson = store.lessons_by_teacher(tid).await.unwrap().pop().unwrap();
        assert_eq!(&lesson.title, "Conditionals");
        assert_eq!(lesson.video, None);
        assert_eq!(lesson.level_id, Some(lid));

        let resp = get_page(&app, "/lecciones_web", Some(&cookie)).await;
        let body = body_string(resp).await;
        assert!(body.contains("Conditionals"));
        assert!(body.contains("Pedro"));

        let form = format!(
            "teacher_id={}&title=Conditionals&content=If+I+were...&video=https%3A%2F%2Fvideo.example.com%2F1&level_id=",
            tid
        );
        let uri = format!("/editar_leccion_web/{}", lesson.id);
        let resp = post_form(&app, &uri, Some(&cookie), &form).await;
        assert_eq!(location(&resp), Some("/lecciones_web"));
        let lesson = store.lesson(lesson.id).await.unwrap().unwrap();
        assert_eq!(lesson.video.as_deref(), Some("https://video.example.com/1"));
        assert_eq!(lesson.level_id, None);
    }

    #[tokio::test]
    async fn lesson_needs_teacher_and_title() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let tid = setup_teacher(glob.store.as_ref()).await;

        let resp = post_form(&app, "/nuevo_leccion_web", Some(&cookie), "title=X&content=Y").await;
        assert!(body_string(resp).await.contains("Choose a teacher."));

        let form = format!("teacher_id={}&title=&content=Y", tid);
        let resp = post_form(&app, "/nuevo_leccion_web", Some(&cookie), &form).await;
        assert!(body_string(resp).await.contains("Title is required."));

        let resp = post_form(&app, "/nuevo_leccion_web", Some(&cookie), "teacher_id=999&title=X&content=Y").await;
        assert!(body_string(resp).await.contains("There is no teacher with id 999."));

        assert!(glob.store.lessons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_lesson_drops_exercises() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();
        let tid = setup_teacher(store).await;

        let lesson_id = store.insert_lesson(&Lesson {
            id: 0,
            teacher_id: tid,
            title: "Phrasal verbs".to_owned(),
            content: "Give up, give in.".to_owned(),
            video: None,
            level_id: None,
        }).await.unwrap();
        let ex_id = store.insert_exercise(&Exercise {
            id: 0,
            lesson_id,
            question: "To stop trying: give ___".to_owned(),
            kind: ExerciseKind::FillInTheBlank,
            options: None,
            answer: "up".to_owned(),
        }).await.unwrap();

        let uri = format!("/eliminar_leccion_web/{}", lesson_id);
        let resp = post_form(&app, &uri, Some(&cookie), "").await;
        assert_eq!(location(&resp), Some("/lecciones_web"));

        assert!(store.lesson(lesson_id).await.unwrap().is_none());
        assert!(store.exercise(ex_id).await.unwrap().is_none());
        assert!(store.teacher(tid).await.unwrap().is_some());

        let resp = get_page(&app, "/lecciones_web", Some(&cookie)).await;
        assert!(!body_string(resp).await.contains("Phrasal verbs"));
    }
}
