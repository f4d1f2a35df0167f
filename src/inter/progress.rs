/*!
Students answering exercises, and the record of how they did.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use super::*;
use crate::{
    progress::Progress,
    session::Category,
    store::{ExerciseRepo, ProgressRepo, StudentRepo, UserRepo},
    DATETIME_FMT,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnswerForm {
    pub answer: String,
}

pub async fn answer(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<AnswerForm>
) -> Response {
    log::trace!("progress::answer( {}, {:?} ) called.", &id, &form);

    let user = match visit.user().await {
        Some(u) => u,
        None => { return redirect("/login"); },
    };
    let store = visit.store();

    let exercise = match visit.found(store.exercise(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let back = format!("/ver_ejercicio_web/{}", id);

    let student = match visit.loaded(store.student_by_user(user.id).await) {
        Ok(Some(s)) => s,
        Ok(None) => {
            visit.flash(Category::Warning, "Only students can answer exercises.").await;
            return redirect(&back);
        },
        Err(r) => { return r; },
    };

    if blank_means_none(&form.answer).is_none() {
        visit.flash(Category::Warning, "Enter an answer first.").await;
        return redirect(&back);
    }

    let p = Progress::grade(student.id, &exercise, &form.answer);
    if let Err(e) = store.insert_progress(&p).await {
        log::error!("Error recording progress {:?}: {}", &p, &e);
        visit.flash(Category::Danger, format!("Unable to record your answer: {}", &e)).await;
        return redirect(&back);
    }

    if p.passed() {
        visit.flash(Category::Success, "Correct!").await;
    } else {
        visit.flash(
            Category::Info,
            format!("Not quite. The expected answer was {:?}.", exercise.answer.trim())
        ).await;
    }

    redirect(&back)
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("progress::list() called.");

    let store = visit.store();
    let (progress, students, users, exercises) = match (
        visit.loaded(store.progress().await),
        visit.loaded(store.students().await),
        visit.loaded(store.users().await),
        visit.loaded(store.exercises().await),
    ) {
        (Ok(p), Ok(s), Ok(u), Ok(x)) => (p, s, u, x),
        (Err(r), _, _, _) | (_, Err(r), _, _)
        | (_, _, Err(r), _) | (_, _, _, Err(r)) => { return r; },
    };

    let user_names = names(users.iter().map(|u| (u.id, u.name.as_str())));
    let student_names: HashMap<i64, &String> = students.iter()
        .filter_map(|s| user_names.get(&s.user_id).map(|name| (s.id, name)))
        .collect();
    let questions = names(exercises.iter().map(|x| (x.id, x.question.as_str())));

    let rows: Vec<Value> = progress.iter().map(|p| json!({
        "progress": p,
        "student_name": student_names.get(&p.student_id),
        "question": questions.get(&p.exercise_id),
        "completed": p.completed.format(DATETIME_FMT).unwrap_or_default(),
        "passed": p.passed(),
    })).collect();

    visit.render("progreso", json!({ "progress": rows })).await
}

#[cfg(test)]
mod tests {
    use super::super::exercises::tests::setup_lesson;
    use super::super::tests::*;
    use super::*;
    use crate::course::{Exercise, ExerciseKind};
    use crate::store::LevelRepo;
    use crate::user::{hash_password, NewUser, Role, Student};
    use crate::DATE_FMT;

    #[tokio::test]
    async fn answering_records_progress() {
        let (app, glob) = test_app().await;
        let store = glob.store.as_ref();

        let lesson_id = setup_lesson(store).await;
        let ex_id = store.insert_exercise(&Exercise {
            id: 0,
            lesson_id,
            question: "I ___ to school yesterday.".to_owned(),
            kind: ExerciseKind::FillInTheBlank,
            options: None,
            answer: "went".to_owned(),
        }).await.unwrap();

        let level_id = store.insert_level("A1").await.unwrap();
        let uid = store.insert_user(&NewUser {
            name: "Lucia".to_owned(),
            email: "lucia@example.com".to_owned(),
            password_hash: hash_password("clave").unwrap(),
            role: Role::Student,
        }).await.unwrap();
        let sid = store.insert_student(&Student {
            id: 0,
            user_id: uid,
            level_id,
            birth: time::Date::parse("2008-03-14", DATE_FMT).unwrap(),
        }).await.unwrap();

        let resp = post_form(&app, "/login", None, "email=lucia%40example.com&password=clave").await;
        let cookie = session_cookie(&resp).unwrap();

        let uri = format!("/responder_ejercicio_web/{}", ex_id);
        let resp = post_form(&app, &uri, Some(&cookie), "answer=+Went+").await;
        assert_eq!(location(&resp), Some(format!("/ver_ejercicio_web/{}", ex_id).as_str()));
        let resp = post_form(&app, &uri, Some(&cookie), "answer=goed").await;
        let page = location(&resp).unwrap().to_owned();

        let resp = get_page(&app, &page, Some(&cookie)).await;
        assert!(body_string(resp).await.contains("Not quite."));

        let mut scores: Vec<Option<i32>> = store.progress_by_student(sid).await.unwrap()
            .iter().map(|p| p.score).collect();
        scores.sort();
        assert_eq!(scores, vec![Some(0), Some(100)]);

        let resp = get_page(&app, "/progreso_web", Some(&cookie)).await;
        let body = body_string(resp).await;
        assert!(body.contains("Lucia"));
        assert!(body.contains("I ___ to school yesterday."));
    }

    #[tokio::test]
    async fn non_students_cannot_answer() {
        let (app, glob) = test_app().await;
        let cookie = admin_cookie(&app).await;
        let store = glob.store.as_ref();

        let lesson_id = setup_lesson(store).await;
        let ex_id = store.insert_exercise(&Exercise {
            id: 0,
            lesson_id,
            question: "Past of 'see'?".to_owned(),
            kind: ExerciseKind::ShortAnswer,
            options: None,
            answer: "saw".to_owned(),
        }).await.unwrap();

        let uri = format!("/responder_ejercicio_web/{}", ex_id);
        let resp = post_form(&app, &uri, Some(&cookie), "answer=saw").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(store.progress().await.unwrap().is_empty());

        let resp = post_form(&app, "/responder_ejercicio_web/999", Some(&cookie), "answer=saw").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
