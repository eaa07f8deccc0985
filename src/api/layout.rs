use dioxus::prelude::*;
use serde::Serialize;

use crate::api::binder::{
    Binding, AUTHOR_CHART_OUTPUT, AUTHOR_LABEL_OUTPUT, AUTHORS_CONTROL, BINDINGS, TAG_CHART_OUTPUT, TAGS_CONTROL,
    TOP10, TOP100, WORDS_CONTROL, WORDS_OUTPUT,
};
use crate::startup::DashboardOptions;

pub const UPDATE_PATH: &str = "/dash/_update";
const PLOTLY_SRC: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const STYLE: &str = r#"
body { margin: 0; background: #f2f2f2; font-family: "Open Sans", "HelveticaNeue", "Helvetica Neue", Helvetica, Arial, sans-serif; color: #333; }
.study-browser-banner { display: flex; align-items: center; justify-content: space-between; background: #355876; color: #fff; padding: 0 24px; }
.h2-title { font-weight: 400; }
.logo { height: 48px; }
.app-body { display: flex; gap: 16px; padding: 16px; }
.four.columns { flex: 1; }
.eight.columns { flex: 2; }
.bg-white { background: #fff; padding: 12px 16px; margin-bottom: 16px; }
.dropdown { width: 100%; padding: 6px; }
.graph { min-height: 300px; }
.error-panel { border: 1px solid #e0b4b4; background: #fff6f6; color: #9f3a38; padding: 12px; }
#error-message:empty { display: none; }
"#;

const TAG_PLACEHOLDER: &str = "Select a Tag...";

const CLIENT_SCRIPT: &str = r#"
(function () {
  const config = JSON.parse(document.getElementById('dash-config').textContent);
  const inflight = {};
  const latest = {};
  let seq = 0;

  function controlValue(id) {
    const el = document.getElementById(id);
    if (el.multiple) {
      return Array.from(el.selectedOptions).map(function (o) { return o.value; });
    }
    return el.value;
  }

  function showError(el, message, retryable) {
    if (window.Plotly) { Plotly.purge(el); }
    el.innerHTML = '';
    const panel = document.createElement('div');
    panel.className = 'error-panel';
    panel.textContent = message + (retryable ? ' (temporary, change the selection to retry)' : '');
    el.appendChild(panel);
  }

  function clearBanner() {
    document.getElementById('error-message').textContent = '';
  }

  function render(output, artifact) {
    const el = document.getElementById(output);
    if (artifact.kind === 'image') {
      el.innerHTML = '';
      const img = document.createElement('img');
      img.src = artifact.src;
      el.appendChild(img);
    } else if (artifact.kind === 'text') {
      el.textContent = artifact.text;
    } else if (artifact.kind === 'figure') {
      if (el.querySelector('.error-panel')) { el.innerHTML = ''; }
      Plotly.react(el, artifact.figure.data, artifact.figure.layout);
    } else if (artifact.kind === 'error') {
      showError(el, artifact.message, artifact.retryable);
    }
  }

  function update(binding) {
    const output = binding.output;
    if (inflight[output]) { inflight[output].abort(); }
    const controller = new AbortController();
    inflight[output] = controller;
    const mine = ++seq;
    latest[output] = mine;

    fetch(config.update_url, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ output: output, value: controlValue(binding.input), seq: mine }),
      signal: controller.signal
    })
      .then(function (r) { return r.json(); })
      .then(function (body) {
        if (!body.data) {
          document.getElementById('error-message').textContent = (body.meta && body.meta.message) || 'Update failed';
          return;
        }
        if (body.data.seq !== latest[output]) { return; }
        clearBanner();
        render(output, body.data.artifact);
      })
      .catch(function (err) {
        if (err.name !== 'AbortError') {
          document.getElementById('error-message').textContent = 'Update failed: ' + err;
        }
      });
  }

  config.bindings.forEach(function (binding) {
    document.getElementById(binding.input).addEventListener('change', function () { update(binding); });
    update(binding);
  });
})();
"#;

#[derive(Serialize)]
struct ClientConfig {
    update_url: &'static str,
    bindings: &'static [Binding],
}

/// Everything the page needs, precomputed from the startup options.
#[derive(Clone, PartialEq)]
pub struct PageData {
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub logo_src: Option<String>,
    pub config_json: String,
}

impl PageData {
    pub fn from_options(options: &DashboardOptions) -> Self {
        let config = ClientConfig {
            update_url: UPDATE_PATH,
            bindings: BINDINGS,
        };
        // The JSON lands inside a <script> element.
        let config_json = serde_json::to_string(&config)
            .unwrap_or_else(|_| "{}".to_string())
            .replace("</", "<\\/");

        PageData {
            authors: options.authors.clone(),
            tags: options.tags.clone(),
            logo_src: options.logo.as_ref().map(|logo| logo.data_uri()),
            config_json,
        }
    }
}

#[allow(non_snake_case)]
#[component]
fn Dashboard(page: PageData) -> Element {
    rsx! {
        head {
            meta { charset: "utf-8" }
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            title { "Towards Data Science Explorer" }
            style { dangerous_inner_html: STYLE }
            script { src: PLOTLY_SRC }
        }
        body {
            div { id: "error-message" }

            // Top banner
            div { class: "study-browser-banner row",
                h2 { class: "h2-title", "Towards Data Science Explorer" }
                div { class: "div-logo",
                    if let Some(src) = page.logo_src.as_ref() {
                        img { class: "logo", src: "{src}" }
                    }
                }
            }

            div { class: "row app-body",
                // User controls
                div { class: "four columns card",
                    div { class: "bg-white user-control",
                        div { class: "padding-top-bot",
                            h6 { "Top Words (Articles)" }
                            select { id: WORDS_CONTROL, class: "dropdown",
                                option { value: TOP10, selected: true, "TOP 10" }
                                option { value: TOP100, "TOP 100" }
                            }
                            div { id: WORDS_OUTPUT }
                        }
                    }
                    div { class: "bg-white user-control",
                        div { class: "padding-top-bot",
                            h6 { "Authors" }
                            select { id: AUTHORS_CONTROL, class: "dropdown",
                                for (i, author) in page.authors.iter().enumerate() {
                                    if i == 0 {
                                        option { value: "{author}", selected: true, "{author}" }
                                    } else {
                                        option { value: "{author}", "{author}" }
                                    }
                                }
                            }
                        }
                    }
                }

                // Charts
                div { class: "eight columns card-left",
                    div { class: "bg-white",
                        h5 { "Trends in the Data Science (Tags)" }
                        select { id: TAGS_CONTROL, class: "dropdown", multiple: true, title: TAG_PLACEHOLDER,
                            option { value: "", disabled: true, class: "placeholder", "{TAG_PLACEHOLDER}" }
                            for tag in page.tags.iter() {
                                option { value: "{tag}", "{tag}" }
                            }
                        }
                        div { id: TAG_CHART_OUTPUT, class: "graph" }
                    }
                    div { class: "bg-white",
                        h5 { id: AUTHOR_LABEL_OUTPUT }
                        div { id: AUTHOR_CHART_OUTPUT, class: "graph" }
                    }
                }
            }

            script { id: "dash-config", r#type: "application/json", dangerous_inner_html: "{page.config_json}" }
            script { dangerous_inner_html: CLIENT_SCRIPT }
        }
    }
}

/// Renders the complete dashboard document.
pub fn render_dashboard(options: &DashboardOptions) -> String {
    let page = PageData::from_options(options);
    let mut dom = VirtualDom::new_with_props(Dashboard, DashboardProps { page });
    dom.rebuild_in_place();
    format!("<!DOCTYPE html><html lang=\"en\">{}</html>", dioxus::ssr::render(&dom))
}
