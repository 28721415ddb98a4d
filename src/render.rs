//! HTML rendering of view descriptors. No external assets besides the
//! guideline images; styles and the countdown script are inline.

use crate::admin::AdminStatus;
use crate::phase::Phase;
use crate::router::{AdminView, Notice, NoticeLevel, Page, View};
use crate::session::Role;
use crate::timer::format_mmss;

const STYLE: &str = r#"<style>
*{box-sizing:border-box}
body{margin:0;font-family:Arial,sans-serif;background:#fff;color:#1e1e1e}
main{max-width:960px;margin:0 auto;padding:24px}
.main-title{font-size:2.2rem;font-weight:700;text-align:center;margin-bottom:10px}
.phase-header{font-size:1.5rem;font-weight:600;color:#0068c9;margin-bottom:20px;text-align:center;border-bottom:2px solid #eee;padding-bottom:10px}
.instruction-box{background:#f8f9fa;padding:25px;border-radius:10px;border:1px solid #ddd;margin-bottom:20px;line-height:1.6}
.timer{background:#fff0f6;border:2px solid #d63384;padding:15px;border-radius:10px;font-size:1.5rem;font-weight:bold;color:#d63384;text-align:center;box-shadow:0 4px 6px rgba(0,0,0,.1);margin:5px 0 20px}
.notice{padding:12px 16px;border-radius:8px;margin-bottom:16px}
.notice.error{background:#fdecea;border:1px solid #f5c2c0;color:#8a1c1c}
.notice.info{background:#e8f4fd;border:1px solid #b6dcf7;color:#0b4f7c}
.guide img{max-width:100%;border:1px solid #ddd;border-radius:6px;margin-bottom:12px}
.chat{display:flex;flex-direction:column;gap:10px;margin-bottom:16px}
.msg{padding:10px 14px;border-radius:10px;white-space:pre-wrap;line-height:1.5}
.msg.user{background:#e8f0fe;align-self:flex-end;max-width:80%}
.msg.assistant{background:#f1f3f4;align-self:flex-start;max-width:80%}
.msg .who{font-size:.75rem;color:#666;display:block;margin-bottom:4px}
textarea,input[type=text],input[type=password],select{width:100%;font-size:1.1rem;line-height:1.6;padding:8px;border:1px solid #ccc;border-radius:6px}
button,.btn{background:#0068c9;color:#fff;border:none;border-radius:6px;padding:10px 18px;font-size:1rem;cursor:pointer;text-decoration:none;display:inline-block;margin-top:8px}
button.secondary{background:#6c757d}
button.danger{background:#c9302c}
.row{display:flex;gap:12px;flex-wrap:wrap;align-items:flex-end}
table.status td{padding:4px 12px 4px 0}
</style>"#;

/// Keeps the hosting connection warm while a participant reads or types.
const HEARTBEAT_SCRIPT: &str = r#"<script>
setInterval(function(){fetch("/heartbeat",{cache:"no-store"});},300000);
</script>"#;

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n{STYLE}\n</head>\n<body>\n<main>\n\
         <div class=\"main-title\">{title}</div>\n{body}\n</main>\n{HEARTBEAT_SCRIPT}\n</body>\n</html>",
        title = escape_html(title),
    )
}

/// Countdown banner. The server supplies the remaining seconds; the browser
/// only counts down. Reaching zero changes the label and nothing else.
pub fn timer_banner(remaining_seconds: u64, message: &str) -> String {
    format!(
        r#"<div class="timer">&#9203; {message}: <span id="time">{initial}</span></div>
<script>
(function(){{
  var timer = {remaining_seconds}, display = document.getElementById("time");
  var tick = setInterval(function(){{
    if (--timer < 0) {{ clearInterval(tick); display.textContent = "00:00 (Time's Up!)"; return; }}
    var m = Math.floor(timer / 60), s = timer % 60;
    display.textContent = (m < 10 ? "0" + m : m) + ":" + (s < 10 ? "0" + s : s);
  }}, 1000);
}})();
</script>"#,
        message = escape_html(message),
        initial = if remaining_seconds == 0 {
            "00:00 (Time's Up!)".to_string()
        } else {
            format_mmss(remaining_seconds)
        },
    )
}

fn notice_html(notice: Option<&Notice>) -> String {
    match notice {
        Some(n) => {
            let class = match n.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Error => "error",
            };
            format!("<div class=\"notice {class}\">{}</div>\n", escape_html(&n.text))
        }
        None => String::new(),
    }
}

/// Render a participant page.
pub fn render_page(title: &str, page: &Page) -> String {
    let phase = page.view.phase();
    let mut body = format!("<div class=\"phase-header\">{}</div>\n", escape_html(phase.label()));
    body.push_str(&notice_html(page.notice.as_ref()));
    body.push_str(&match &page.view {
        View::Login => render_login(),
        View::Instruction { guide_images, remaining_seconds } => {
            let mut html = timer_banner(*remaining_seconds, "Reading Time Remaining");
            html.push_str(
                "<div class=\"instruction-box\">Please read the guideline below carefully. \
                 When you are ready, start the brainstorming session.</div>\n<div class=\"guide\">\n",
            );
            for img in guide_images {
                match &img.error {
                    None => html.push_str(&format!(
                        "<img src=\"{}\" alt=\"{}\">\n",
                        escape_html(&img.url()),
                        escape_html(&img.name)
                    )),
                    Some(err) => html.push_str(&format!(
                        "<div class=\"notice error\">{}</div>\n",
                        escape_html(err)
                    )),
                }
            }
            html.push_str(
                "</div>\n<form method=\"post\" action=\"/instruction/confirm\">\
                 <button type=\"submit\">I am ready to start brainstorming</button></form>\n",
            );
            html
        }
        View::Brainstorming { transcript, remaining_seconds } => {
            let mut html = timer_banner(*remaining_seconds, "Brainstorming Time Remaining");
            html.push_str(
                "<div class=\"instruction-box\">Brainstorm ideas for your short science-fiction \
                 story with the AI partner: characters, setting, and a plot with a beginning, \
                 middle, and end.</div>\n<div class=\"chat\">\n",
            );
            for turn in transcript {
                let (class, who) = match turn.role {
                    Role::User => ("user", "You"),
                    Role::Assistant => ("assistant", "AI"),
                };
                html.push_str(&format!(
                    "<div class=\"msg {class}\"><span class=\"who\">{who}</span>{}</div>\n",
                    escape_html(&turn.content)
                ));
            }
            html.push_str(
                "</div>\n<form method=\"post\" action=\"/chat\">\
                 <textarea name=\"message\" rows=\"3\" placeholder=\"Share your idea...\" required></textarea>\
                 <button type=\"submit\">Send</button></form>\n\
                 <form method=\"post\" action=\"/finish\">\
                 <button type=\"submit\" class=\"secondary\">Finish brainstorming</button></form>\n",
            );
            html
        }
        View::Submission { participant_id, redirect_url } => format!(
            "<div class=\"instruction-box\">Thank you, {}. The brainstorming session is complete. \
             Please continue to the survey to finish the study.</div>\n\
             <a class=\"btn\" href=\"{}\">Go to the survey</a>\n",
            escape_html(participant_id),
            escape_html(redirect_url)
        ),
    });
    layout(title, &body)
}

fn render_login() -> String {
    "<div class=\"instruction-box\">Welcome. Please enter the participant ID you were given.</div>\n\
     <form method=\"post\" action=\"/login\">\
     <input type=\"text\" name=\"participant_id\" placeholder=\"Participant ID\" autofocus>\
     <button type=\"submit\">Start</button></form>\n"
        .to_string()
}

/// Admin lock screen.
pub fn render_admin_locked(title: &str, notice: Option<&Notice>) -> String {
    let mut body = String::from("<div class=\"phase-header\">Researcher Admin</div>\n");
    body.push_str(&notice_html(notice));
    body.push_str(
        "<form method=\"post\" action=\"/admin\">\
         <input type=\"password\" name=\"passphrase\" placeholder=\"Admin Password\" autofocus>\
         <button type=\"submit\">Unlock</button></form>\n",
    );
    layout(title, &body)
}

fn render_status(status: &Option<AdminStatus>, phase: Phase, remaining: Option<u64>) -> String {
    match status {
        Some(s) => format!(
            "<table class=\"status\">\
             <tr><td><b>ID:</b></td><td>{}</td></tr>\
             <tr><td><b>Group:</b></td><td>{} ({})</td></tr>\
             <tr><td><b>Phase:</b></td><td>{}</td></tr>\
             <tr><td><b>Timer:</b></td><td>{}</td></tr></table>\n",
            escape_html(&s.participant_id),
            escape_html(&s.assigned_group),
            escape_html(&s.condition_label),
            escape_html(phase.label()),
            remaining.map(format_mmss).unwrap_or_else(|| "-".to_string()),
        ),
        None => "<div class=\"notice info\">No participant logged in.</div>\n".to_string(),
    }
}

/// Unlocked admin panel. The forms carry no credentials; the browser's
/// session holds the unlock.
pub fn render_admin(title: &str, view: &AdminView, notice: Option<&str>) -> String {
    let mut body = String::from("<div class=\"phase-header\">Researcher Admin</div>\n");
    body.push_str("<div class=\"notice info\">Unlocked</div>\n");
    if let Some(n) = notice {
        body.push_str(&format!("<div class=\"notice info\">{}</div>\n", escape_html(n)));
    }
    body.push_str("<h3>Status Monitor</h3>\n");
    body.push_str(&render_status(&view.status, view.phase, view.remaining_seconds));
    if view.status.is_some() {
        body.push_str(
            "<form method=\"post\" action=\"/admin/reset-timer\">\
             <button type=\"submit\" class=\"secondary\">Reset Timer</button></form>\n\
             <form method=\"post\" action=\"/admin/export\">\
             <button type=\"submit\">Download chat log (JSON)</button></form>\n",
        );
    }

    body.push_str("<h3>Controls</h3>\n");
    let options: String = Phase::ALL
        .iter()
        .map(|p| {
            let selected = if *p == view.phase { " selected" } else { "" };
            format!(
                "<option value=\"{}\"{selected}>{}</option>",
                escape_html(p.label()),
                escape_html(p.label())
            )
        })
        .collect();
    body.push_str(&format!(
        "<form method=\"post\" action=\"/admin/phase\">\
         <label>Force Phase Jump:</label><select name=\"phase\">{options}</select>\
         <button type=\"submit\">Go to Phase</button></form>\n\
         <form method=\"post\" action=\"/admin/clear\">\
         <button type=\"submit\" class=\"danger\">Reset all session data (next participant)</button></form>\n\
         <form method=\"post\" action=\"/admin/lock\">\
         <button type=\"submit\" class=\"secondary\">Lock admin panel</button></form>\n\
         <p><a href=\"/\">Back to participant view</a></p>\n"
    ));
    layout(title, &body)
}
