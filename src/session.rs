//! Authenticated web session against the non-API surface. The label
//! mutation is only reachable through the web UI, which wants a session
//! cookie and the CSRF token the UI embeds in a `<meta>` tag.
use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Login;

pub const LOGIN_BASE: &str = "https://login.planningcenteronline.com/";
pub const GIVING_BASE: &str = "https://giving.planningcenteronline.com/";

const USER_AGENT: &str = "giving-labeler/0.1";

/// Credentials for one run of the web UI. Acquired once, reused for every
/// mutation.
#[derive(Debug, Clone)]
pub struct Session {
    pub cookie: String,
    pub csrf_token: String,
}

/// How to obtain a [`Session`], chosen by which credential fields the
/// operator supplied.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// Interactive form login with a follow-up account selection.
    Password {
        email: String,
        password: String,
        user_id: String,
    },
    /// Reuse a session cookie lifted from an existing browser session.
    Cookie { cookie: String },
}

impl AuthStrategy {
    pub fn from_login(login: &Login) -> Result<Self> {
        if let Some(cookie) = login.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok(AuthStrategy::Cookie {
                cookie: cookie.to_owned(),
            });
        }
        match (&login.email, &login.password, &login.user_id) {
            (Some(email), Some(password), Some(user_id)) => Ok(AuthStrategy::Password {
                email: email.clone(),
                password: password.clone(),
                user_id: user_id.clone(),
            }),
            _ => bail!("login section has neither a cookie nor email/password/user_id"),
        }
    }

    pub async fn authenticate(&self) -> Result<Session> {
        match self {
            AuthStrategy::Password {
                email,
                password,
                user_id,
            } => login_with_password(email, password, user_id).await,
            AuthStrategy::Cookie { cookie } => reuse_cookie(cookie).await,
        }
    }
}

/// Strategy A: fetch the login form, submit credentials, pull the CSRF
/// token from the post-login page, then select the target user account.
async fn login_with_password(email: &str, password: &str, user_id: &str) -> Result<Session> {
    let jar = Arc::new(Jar::default());
    let http = Client::builder()
        .user_agent(USER_AGENT)
        .cookie_provider(jar.clone())
        .build()
        .context("failed to build login http client")?;
    let login_base = Url::parse(LOGIN_BASE).expect("valid login base URL");

    let login_page_url = login_base
        .join("login/new?ready=true")
        .expect("valid login page URL");
    let res = http
        .get(login_page_url)
        .send()
        .await
        .context("failed to fetch login page")?;
    if !res.status().is_success() {
        bail!("login page returned {}", res.status());
    }
    let html = res.text().await.context("failed to read login page")?;

    let mut form = parse_login_form(&html)?;
    form.set("login", email)?;
    form.set("password", password)?;
    let action = login_base
        .join(&form.action)
        .context("invalid login form action")?;

    let res = http
        .post(action)
        .form(&form.fields)
        .send()
        .await
        .context("failed to submit login form")?;
    if !res.status().is_success() {
        bail!("login submission returned {}", res.status());
    }
    let html = res.text().await.context("failed to read post-login page")?;
    let csrf_token = extract_csrf_token(&html)?;

    // The account picker: a PUT disguised as a POST, authorized by the
    // freshly minted token.
    let select_url = login_base
        .join(&format!("login?user_id={user_id}"))
        .context("invalid user selection URL")?;
    let res = http
        .post(select_url)
        .form(&[("_method", "PUT"), ("authenticity_token", csrf_token.as_str())])
        .send()
        .await
        .context("failed to select user account")?;
    if !res.status().is_success() {
        bail!("user selection returned {}", res.status());
    }

    let giving_url = Url::parse(GIVING_BASE).expect("valid giving base URL");
    let cookie = jar
        .cookies(&giving_url)
        .and_then(|v| v.to_str().ok().map(str::to_owned))
        .ok_or_else(|| anyhow!("login produced no session cookie"))?;

    info!("logged in as {email}");
    Ok(Session { cookie, csrf_token })
}

/// Strategy B: trust the operator-supplied cookie; hit the dashboard only
/// to harvest the CSRF token. A redirect means the session is stale, and
/// there is no way to refresh it from here, so bail out of the process
/// with enough context for the operator to mint a new cookie.
async fn reuse_cookie(cookie: &str) -> Result<Session> {
    let http = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::none())
        .build()
        .context("failed to build session http client")?;
    let dashboard = Url::parse(GIVING_BASE).expect("valid giving base URL");

    let res = http
        .get(dashboard)
        .header(COOKIE, cookie)
        .send()
        .await
        .context("failed to fetch giving dashboard")?;
    if res.status().is_redirection() {
        let location = res
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<missing>")
            .to_owned();
        let body = res.text().await.unwrap_or_default();
        error!("session cookie rejected; redirected to {location}");
        error!("response body: {body}");
        process::exit(1);
    }
    if !res.status().is_success() {
        bail!("giving dashboard returned {}", res.status());
    }
    let html = res.text().await.context("failed to read giving dashboard")?;
    let csrf_token = extract_csrf_token(&html)?;

    Ok(Session {
        cookie: cookie.to_owned(),
        csrf_token,
    })
}

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<meta\b[^>]*>").unwrap());
static CSRF_NAME_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name\s*=\s*"csrf-token""#).unwrap());
static CONTENT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"content\s*=\s*"([^"]*)""#).unwrap());

/// Pull the token out of `<meta name="csrf-token" content="...">`,
/// whatever the attribute order.
pub fn extract_csrf_token(html: &str) -> Result<String> {
    for tag in META_TAG.find_iter(html) {
        let tag = tag.as_str();
        if CSRF_NAME_ATTR.is_match(tag) {
            if let Some(caps) = CONTENT_ATTR.captures(tag) {
                return Ok(caps[1].to_owned());
            }
        }
    }
    bail!("no csrf-token meta tag in page")
}

static FORM_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<form\b[^>]*>.*?</form>").unwrap());
static ACTION_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"action\s*=\s*"([^"]*)""#).unwrap());
static INPUT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<input\b[^>]*>").unwrap());
static NAME_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"name\s*=\s*"([^"]*)""#).unwrap());
static VALUE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"value\s*=\s*"([^"]*)""#).unwrap());

/// The first form on the login page, with its prefilled fields (hidden
/// authenticity inputs included).
#[derive(Debug)]
pub struct LoginForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Overwrite the value of an existing field; the form not carrying the
    /// field at all is fatal.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| anyhow!("login form has no '{name}' field"))?;
        field.1 = value.to_owned();
        Ok(())
    }
}

pub fn parse_login_form(html: &str) -> Result<LoginForm> {
    let form = FORM_TAG
        .find(html)
        .ok_or_else(|| anyhow!("no form on login page"))?
        .as_str();
    let action = ACTION_ATTR
        .captures(form)
        .map(|caps| caps[1].to_owned())
        .ok_or_else(|| anyhow!("login form has no action"))?;

    let mut fields = Vec::new();
    for input in INPUT_TAG.find_iter(form) {
        let input = input.as_str();
        let Some(name) = NAME_ATTR.captures(input).map(|caps| caps[1].to_owned()) else {
            continue;
        };
        let value = VALUE_ATTR
            .captures(input)
            .map(|caps| caps[1].to_owned())
            .unwrap_or_default();
        fields.push((name, value));
    }
    Ok(LoginForm { action, fields })
}
