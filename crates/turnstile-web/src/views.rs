//! Page handlers.
//!
//! | Path | Methods | Page |
//! |---|---|---|
//! | `/` | GET | Redirect to the dashboard |
//! | `/register` | GET, POST | Registration form |
//! | `/login` | GET, POST | Login form |
//! | `/logout` | GET, POST | Ends the session, redirects to the login page |
//! | `/dashboard` | GET | Protected welcome page |
//!
//! Forms that fail validation are re-rendered with status 200, their field
//! errors and the non-secret values previously entered.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use http::StatusCode;
use serde::Deserialize;
use turnstile_auth::forms::{self, LoginForm, RegistrationForm, INVALID_LOGIN_MESSAGE};
use turnstile_auth::session::{encode_redirect, is_safe_redirect, redirect_to_login, require_login};
use turnstile_core::error::{FieldErrors, TurnstileError, TurnstileResult, NON_FIELD_ERRORS};

use crate::context::RequestContext;
use crate::csrf::CSRF_FORM_FIELD;
use crate::state::AppState;

const REGISTRATION_FIELDS: [&str; 4] = ["username", "email", "password1", "password2"];
const LOGIN_FIELDS: [&str; 2] = ["username", "password"];

/// Submitted form fields, before validation.
type FormFields = HashMap<String, String>;

/// The `next` query parameter of the login page.
#[derive(Debug, Default, Deserialize)]
pub struct NextParam {
    next: Option<String>,
}

// ── Rendering helpers ───────────────────────────────────────────────

fn field(fields: &FormFields, name: &str) -> String {
    fields.get(name).cloned().unwrap_or_default()
}

fn page_context(ctx: &RequestContext) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("csrf_token", ctx.csrf_token());
    context.insert("user", &ctx.user());
    context
}

/// Inserts `errors` with an entry (possibly empty) for every listed field.
fn insert_errors(context: &mut tera::Context, errors: &FieldErrors, fields: &[&str]) {
    let by_field: BTreeMap<&str, &[String]> = fields
        .iter()
        .map(|&name| (name, errors.get(name)))
        .collect();
    context.insert("errors", &by_field);
    context.insert("non_field_errors", errors.get(NON_FIELD_ERRORS));
}

fn render(state: &AppState, name: &str, context: &tera::Context) -> TurnstileResult<Response> {
    Ok(Html(state.templates.render(name, context)?).into_response())
}

fn render_register(
    state: &AppState,
    ctx: &RequestContext,
    form: &RegistrationForm,
    errors: &FieldErrors,
) -> TurnstileResult<Response> {
    let mut context = page_context(ctx);
    context.insert("form", form);
    context.insert("help_texts", &state.policy.help_texts());
    insert_errors(&mut context, errors, &REGISTRATION_FIELDS);
    render(state, "register.html", &context)
}

fn render_login(
    state: &AppState,
    ctx: &RequestContext,
    form: &LoginForm,
    errors: &FieldErrors,
    next: Option<&str>,
) -> TurnstileResult<Response> {
    let mut context = page_context(ctx);
    context.insert("form", form);
    context.insert("next", &next);
    insert_errors(&mut context, errors, &LOGIN_FIELDS);
    render(state, "login.html", &context)
}

/// Renders `error.html` for `err`, falling back to plain text.
fn error_page(state: &AppState, ctx: &RequestContext, err: &TurnstileError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (title, message) = match err {
        TurnstileError::NotFound(_) => (
            "Page not found (404)".to_string(),
            format!("The requested resource {} was not found on this server.", ctx.path),
        ),
        TurnstileError::CsrfFailure(reason) => (
            "Forbidden (403)".to_string(),
            format!("CSRF verification failed. Request aborted. {reason}"),
        ),
        TurnstileError::MethodNotAllowed(_) => (
            "Method Not Allowed (405)".to_string(),
            err.to_string(),
        ),
        e if e.is_client_error() => (format!("Bad Request ({})", status.as_u16()), e.to_string()),
        e => {
            tracing::error!(error = %e, path = %ctx.path, "Request failed");
            (
                "Server Error (500)".to_string(),
                "There's been an error. Please try again later.".to_string(),
            )
        }
    };

    let mut context = page_context(ctx);
    context.insert("title", &title);
    context.insert("message", &message);
    match state.templates.render("error.html", &context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(render_err) => {
            tracing::error!(error = %render_err, "Error page failed to render");
            (status, format!("{title}\n{message}")).into_response()
        }
    }
}

/// Turns a handler outcome into the final response, cookies attached.
fn respond(state: &AppState, ctx: RequestContext, result: TurnstileResult<Response>) -> Response {
    let response = result.unwrap_or_else(|err| error_page(state, &ctx, &err));
    ctx.finish(response)
}

// ── Index ───────────────────────────────────────────────────────────

/// `GET /`
pub async fn index(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let target = Redirect::to(&state.settings.login_redirect_url).into_response();
    ctx.finish(target)
}

// ── Registration ────────────────────────────────────────────────────

/// `GET /register`
pub async fn register_page(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let page = render_register(&state, &ctx, &RegistrationForm::default(), &FieldErrors::new());
    respond(&state, ctx, page)
}

/// `POST /register`
pub async fn register_submit(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(fields): Form<FormFields>,
) -> Response {
    let result = handle_register(&state, &ctx, &fields).await;
    respond(&state, ctx, result)
}

async fn handle_register(
    state: &AppState,
    ctx: &RequestContext,
    fields: &FormFields,
) -> TurnstileResult<Response> {
    ctx.verify_csrf(fields.get(CSRF_FORM_FIELD).map(String::as_str))?;

    let form = RegistrationForm {
        username: field(fields, "username"),
        email: field(fields, "email"),
        password1: field(fields, "password1"),
        password2: field(fields, "password2"),
    };
    match forms::register(&form, state.store.as_ref(), &state.policy).await {
        Ok(_) => Ok(Redirect::to(&state.settings.login_url).into_response()),
        Err(TurnstileError::Validation(errors)) => {
            tracing::debug!(%errors, "Registration rejected");
            render_register(state, ctx, &form.retained(), &errors)
        }
        Err(e) => Err(e),
    }
}

// ── Login ───────────────────────────────────────────────────────────

/// `GET /login`
pub async fn login_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<NextParam>,
) -> Response {
    let page = render_login(
        &state,
        &ctx,
        &LoginForm::default(),
        &FieldErrors::new(),
        params.next.as_deref(),
    );
    respond(&state, ctx, page)
}

/// `POST /login`
pub async fn login_submit(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Query(params): Query<NextParam>,
    Form(fields): Form<FormFields>,
) -> Response {
    let next = fields
        .get("next")
        .filter(|n| !n.is_empty())
        .cloned()
        .or(params.next);
    let result = handle_login(&state, &mut ctx, &fields, next.as_deref()).await;
    respond(&state, ctx, result)
}

async fn handle_login(
    state: &AppState,
    ctx: &mut RequestContext,
    fields: &FormFields,
    next: Option<&str>,
) -> TurnstileResult<Response> {
    ctx.verify_csrf(fields.get(CSRF_FORM_FIELD).map(String::as_str))?;

    let form = LoginForm {
        username: field(fields, "username"),
        password: field(fields, "password"),
    };
    match forms::validate_login(&form, state.store.as_ref()).await {
        Ok(user) => {
            let cookie = state.sessions.login(ctx.session_cookie(), &user).await?;
            ctx.set_session(&cookie);
            ctx.rotate_csrf_token();

            let target = next
                .filter(|n| is_safe_redirect(n))
                .unwrap_or(state.settings.login_redirect_url.as_str());
            Ok(Redirect::to(&encode_redirect(target)).into_response())
        }
        Err(TurnstileError::Validation(errors)) => {
            render_login(state, ctx, &form.retained(), &errors, next)
        }
        Err(TurnstileError::InvalidCredentials) => {
            let mut errors = FieldErrors::new();
            errors.add_non_field(INVALID_LOGIN_MESSAGE);
            render_login(state, ctx, &form.retained(), &errors, next)
        }
        Err(e) => Err(e),
    }
}

// ── Logout ──────────────────────────────────────────────────────────

/// `GET /logout`
pub async fn logout_get(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = handle_logout(&state, &mut ctx).await;
    respond(&state, ctx, result)
}

/// `POST /logout`
pub async fn logout_post(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Form(fields): Form<FormFields>,
) -> Response {
    let result = match ctx.verify_csrf(fields.get(CSRF_FORM_FIELD).map(String::as_str)) {
        Ok(()) => handle_logout(&state, &mut ctx).await,
        Err(e) => Err(e),
    };
    respond(&state, ctx, result)
}

async fn handle_logout(state: &AppState, ctx: &mut RequestContext) -> TurnstileResult<Response> {
    state.sessions.logout(ctx.session_cookie()).await?;
    if ctx.session_cookie().is_some() {
        ctx.clear_session();
    }
    Ok(Redirect::to(&state.settings.logout_redirect_url).into_response())
}

// ── Dashboard ───────────────────────────────────────────────────────

/// `GET /dashboard`
pub async fn dashboard(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let result = match require_login(&ctx.auth) {
        Ok(_) => render(&state, "dashboard.html", &page_context(&ctx)),
        Err(TurnstileError::LoginRequired) => {
            let target = redirect_to_login(&state.settings.login_url, &ctx.path);
            Ok(Redirect::to(&target).into_response())
        }
        Err(e) => Err(e),
    };
    respond(&state, ctx, result)
}

// ── Fallback ────────────────────────────────────────────────────────

/// Any unrouted path.
pub async fn not_found(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let err = TurnstileError::NotFound(ctx.path.clone());
    respond(&state, ctx, Err(err))
}

/// A known path requested with an unsupported method.
pub async fn method_not_allowed(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let err = TurnstileError::MethodNotAllowed(ctx.path.clone());
    respond(&state, ctx, Err(err))
}
