//! Server-side HTML for the optimizer page: the form plus a view of the
//! current lifecycle state. Templates are auto-escaped (`.html` names).

use minijinja::{context, Environment};
use serde::Serialize;

use crate::lifecycle::LifecycleState;

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>AI Resume Optimizer</title>
{%- if refresh_secs %}
<meta http-equiv="refresh" content="{{ refresh_secs }}">
{%- endif %}
</head>
<body>
<header>
  <h1>AI Resume Optimizer</h1>
  <p>Tailor your resume precisely to any job description.</p>
</header>
<main>
<section id="form">
  <form method="post" action="/optimize">
    <label for="resume_text">Your Current Resume</label>
    <textarea id="resume_text" name="resume_text" placeholder="Paste your resume text here..." required>{{ form.resume_text }}</textarea>
    <label for="job_description">Target Job Description</label>
    <textarea id="job_description" name="job_description" placeholder="Paste the job description here..." required>{{ form.job_description }}</textarea>
    <button type="submit"{% if busy %} disabled{% endif %}>{{ button_label }}</button>
  </form>
  {%- if form_error %}
  <div class="error" role="alert">{{ form_error }}</div>
  {%- elif status == "error" %}
  <div class="error" role="alert">{{ state.message }}</div>
  {%- endif %}
  {%- if terminal %}
  <form method="post" action="/reset"><button type="submit">Start over</button></form>
  {%- endif %}
</section>
<section id="result" data-status="{{ status }}">
  <h2>Optimization Result</h2>
  {%- if status == "idle" or status == "error" %}
  <p>Your optimized resume will appear here</p>
  {%- elif status == "submitting" %}
  <p>Connecting to backend...</p>
  {%- elif status == "processing" %}
  <p>AI is tailoring your resume...</p>
  <p>This might take a few seconds.</p>
  {%- elif status == "completed" %}
  {%- set result = state.result %}
  <p>Optimization Complete</p>
  <dl class="scores">
    <dt>Current Match</dt>
    <dd>{% if result.relevance_score is not none %}{{ result.relevance_score|score }}%{% else %}n/a{% endif %}</dd>
    <dt>Optimized Potential</dt>
    <dd>{% if result.optimized_score is not none %}{{ result.optimized_score|score }}%{% else %}n/a{% endif %}</dd>
  </dl>
  {%- if score_gain is not none %}
  <p class="gain">{% if score_gain > 0 %}+{% endif %}{{ score_gain|score }} points</p>
  {%- endif %}
  {%- if result.tailored_profile %}
  <h3>Recommended Profile Summary</h3>
  <blockquote>{{ result.tailored_profile }}</blockquote>
  {%- endif %}
  {%- if result.project_suggestions %}
  <h3>Project Roadmap for Alignment</h3>
  <ol class="suggestions">
    {%- for suggestion in result.project_suggestions %}
    <li>{{ suggestion }}</li>
    {%- endfor %}
  </ol>
  {%- endif %}
  {%- if result.missing_keywords %}
  <h3>Missing Keywords</h3>
  <ul class="keywords">
    {%- for keyword in result.missing_keywords %}
    <li>{{ keyword }}</li>
    {%- endfor %}
  </ul>
  {%- endif %}
  <h3>Full Optimized Content</h3>
  <pre class="resume">{{ result.optimized_resume }}</pre>
  {%- endif %}
</section>
</main>
</body>
</html>
"#;

/// Form fields as last entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct FormDraft {
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub job_description: String,
}

pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_filter("score", format_score);
        env.add_template("page.html", PAGE_TEMPLATE)?;
        Ok(Self { env })
    }

    /// `refresh_secs` makes the browser reload while a cycle is running, so the
    /// page follows the lifecycle without client-side script.
    pub fn render_page(
        &self,
        state: &LifecycleState,
        form: &FormDraft,
        form_error: Option<&str>,
        refresh_secs: u64,
    ) -> Result<String, minijinja::Error> {
        let busy = state.is_busy();
        let score_gain = match state {
            LifecycleState::Completed { result } => result.score_gain(),
            _ => None,
        };
        let button_label = match state {
            LifecycleState::Idle | LifecycleState::Error { .. } => "Optimize Resume",
            LifecycleState::Completed { .. } => "Optimize Another",
            LifecycleState::Submitting | LifecycleState::Processing { .. } => "Processing...",
        };

        self.env.get_template("page.html")?.render(context! {
            state => state,
            status => state.label(),
            form => form,
            form_error => form_error,
            busy => busy,
            terminal => state.is_terminal(),
            score_gain => score_gain,
            button_label => button_label,
            refresh_secs => busy.then_some(refresh_secs.max(1)),
        })
    }
}

/// Whole scores print without a decimal point.
fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
