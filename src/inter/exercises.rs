/*!
Pages for managing `Exercise`s.
*/
use axum::{
    extract::Form,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::{
    course::{Exercise, ExerciseKind},
    session::Category,
    store::{ExerciseRepo, LessonRepo, StudentRepo},
};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExerciseForm {
    pub lesson_id: String,
    pub question: String,
    pub kind: String,
    /// Comma-separated choices.
    pub options: String,
    pub answer: String,
}

impl From<&Exercise> for ExerciseForm {
    fn from(x: &Exercise) -> Self {
        Self {
            lesson_id: x.lesson_id.to_string(),
            question: x.question.clone(),
            kind: x.kind.as_str().to_owned(),
            options: x.options.clone().unwrap_or_default(),
            answer: x.answer.clone(),
        }
    }
}

async fn validate(
    store: &dyn Repo,
    form: &ExerciseForm,
    id: Option<i64>
) -> Result<Exercise, String> {
    let lesson_id = parse_id(&form.lesson_id).ok_or("Choose a lesson.")?;
    let question = blank_means_none(&form.question).ok_or("Question is required.")?;
    let kind: ExerciseKind = blank_means_none(&form.kind)
        .ok_or("Exercise type is required.")?
        .parse()?;
    let answer = blank_means_none(&form.answer).ok_or("Answer is required.")?;

    match store.lesson(lesson_id).await {
        Err(e) => { return Err(format!("Unable to look up lesson: {}", &e)); },
        Ok(None) => { return Err(format!("There is no lesson with id {}.", &lesson_id)); },
        Ok(Some(_)) => {},
    }

    Ok(Exercise {
        id: id.unwrap_or(0),
        lesson_id,
        question: question.to_owned(),
        kind,
        options: blank_means_none(&form.options).map(|s| s.to_owned()),
        answer: answer.to_owned(),
    })
}

fn kind_choices() -> Vec<Value> {
    ExerciseKind::ALL.iter()
        .map(|k| json!({ "value": k.as_str(), "label": k.label() }))
        .collect()
}

async fn render_form(
    visit: &Visit,
    template: &str,
    form: &ExerciseForm,
    id: Option<i64>
) -> Response {
    let lessons = match visit.loaded(visit.store().lessons().await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    visit.render(template, json!({
        "id": id,
        "form": form,
        "lessons": lessons,
        "kinds": kind_choices(),
    })).await
}

pub async fn list(visit: Visit) -> Response {
    log::trace!("exercises::list() called.");

    let store = visit.store();
    let (exercises, lessons) = match (
        visit.loaded(store.exercises().await),
        visit.loaded(store.lessons().await),
    ) {
        (Ok(x), Ok(l)) => (x, l),
        (Err(r), _) | (_, Err(r)) => { return r; },
    };

    let titles = names(lessons.iter().map(|l| (l.id, l.title.as_str())));
    let rows: Vec<Value> = exercises.iter().map(|x| json!({
        "exercise": x,
        "kind_label": x.kind.label(),
        "lesson_title": titles.get(&x.lesson_id),
    })).collect();

    visit.render("ejercicios", json!({ "exercises": rows })).await
}

pub async fn new_form(visit: Visit) -> Response {
    let form = ExerciseForm {
        kind: ExerciseKind::MultipleChoice.as_str().to_owned(),
        ..Default::default()
    };
    render_form(&visit, "nuevo_ejercicio", &form, None).await
}

pub async fn create(visit: Visit, Form(form): Form<ExerciseForm>) -> Response {
    log::trace!("exercises::create( {:?} ) called.", &form);

    let exercise = match validate(visit.store(), &form, None).await {
        Ok(x) => x,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "nuevo_ejercicio", &form, None).await;
        },
    };

    if let Err(e) = visit.store().insert_exercise(&exercise).await {
        log::error!("Error inserting exercise {:?}: {}", &exercise, &e);
        visit.flash(Category::Danger, format!("Unable to create exercise: {}", &e)).await;
        return render_form(&visit, "nuevo_ejercicio", &form, None).await;
    }

    visit.flash(Category::Success, "Exercise created.").await;
    redirect("/ejercicios_web")
}

/// Shows the exercise, and an answer form to users with a student profile.
pub async fn view(visit: Visit, Id(id): Id) -> Response {
    log::trace!("exercises::view( {} ) called.", &id);

    let store = visit.store();
    let exercise = match visit.found(store.exercise(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };
    let lesson = match visit.loaded(store.lesson(exercise.lesson_id).await) {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    let can_answer = match visit.user().await {
        None => false,
        Some(u) => match visit.loaded(store.student_by_user(u.id).await) {
            Ok(s) => s.is_some(),
            Err(r) => { return r; },
        },
    };

    visit.render("ver_ejercicio", json!({
        "exercise": &exercise,
        "kind_label": exercise.kind.label(),
        "choices": exercise.choices(),
        "lesson": lesson,
        "can_answer": can_answer,
    })).await
}

pub async fn edit_form(visit: Visit, Id(id): Id) -> Response {
    let exercise = match visit.found(visit.store().exercise(id).await).await {
        Ok(x) => x,
        Err(r) => { return r; },
    };

    render_form(&visit, "editar_ejercicio", &ExerciseForm::from(&exercise), Some(id)).await
}

pub async fn update(
    visit: Visit,
    Id(id): Id,
    Form(form): Form<ExerciseForm>
) -> Response {
    log::trace!("exercises::update( {}, {:?} ) called.", &id, &form);

    if let Err(r) = visit.found(visit.store().exercise(id).await).await {
        return r;
    }

    let exercise = match validate(visit.store(), &form, Some(id)).await {
        Ok(x) => x,
        Err(msg) => {
            visit.flash(Category::Danger, msg).await;
            return render_form(&visit, "editar_ejercicio", &form, Some(id)).await;
        },
    };

    if let Err(e) = visit.store().update_exercise(&exercise).await {
        log::error!("Error updating exercise {}: {}", &id, &e);
        visit.flash(Category::Danger, format!("Unable to update exercise: {}", &e)).await;
        return render_form(&visit, "editar_ejercicio", &form, Some(id)).await;
    }

    visit.flash(Category::Success, "Exercise updated.").await;
    redirect("/ejercicios_web")
}

pub async fn delete(visit: Visit, Id(id): Id) -> Response {
    log::trace!("exercises::delete( {} ) called.", &id);

    if let Err(r) = visit.found(visit.store().exercise(id).await).await {
        return r;
    }

    match visit.store().delete_exercise(id).await {
        Ok(_) => {
            visit.flash(Category::Success, "Exercise deleted.").await;
        },
        Err(e) => {
            log::warn!("Unable to delete exercise {}: {}", &id, &e);
            visit.flash(Category::Danger, format!("Unable to delete exercise: {}", &e)).await;
        },
    }

    redirect("/ejercicios_web")
}
