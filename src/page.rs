use crate::controller::PageView;
use crate::session::AudioOutcome;
use std::fmt::Write;

pub const TITLE: &str = "🤖 Voice-Enabled Emotion-Aware Chatbot";
const INTRO: &str = "Type or speak a message, and I'll respond based on your emotions!";

const STYLE: &str = "body{font-family:sans-serif;max-width:42rem;margin:2rem auto;padding:0 1rem}\
label{display:block;margin-top:1rem}\
input[type=text]{width:100%;padding:.5rem}\
textarea{width:100%;height:100px}\
.error{color:#b00020}\
.notice{color:#8a6d3b}";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render(view: &PageView) -> String {
    let mut html = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n<p>{intro}</p>\n",
        title = escape_html(TITLE),
        style = STYLE,
        intro = escape_html(INTRO),
    );

    let _ = write!(
        html,
        "<form method=\"post\" action=\"/submit\">\n\
         <label for=\"text_input\">Type here:</label>\n\
         <input type=\"text\" id=\"text_input\" name=\"text\" value=\"{}\" autofocus>\n\
         </form>\n\
         <form method=\"post\" action=\"/speak\">\n\
         <button type=\"submit\">🎤 Speak</button>\n\
         </form>\n",
        escape_html(&view.text_value)
    );

    if let Some(notice) = &view.notice {
        let _ = writeln!(html, "<p class=\"notice\">{}</p>", escape_html(notice));
    }

    if let Some(heard) = &view.heard {
        let _ = writeln!(html, "<pre id=\"heard\">You said: {}</pre>", escape_html(heard));
    }

    if let Some(turn) = &view.turn {
        let _ = write!(
            html,
            "<label for=\"reply\">Chatbot:</label>\n\
             <textarea id=\"reply\" readonly>{}</textarea>\n",
            escape_html(&turn.reply)
        );
        match &turn.audio {
            AudioOutcome::Ready(artifact) => {
                let _ = writeln!(
                    html,
                    "<audio controls autoplay src=\"{}\" type=\"{}\"></audio>",
                    escape_html(&artifact.url()),
                    artifact.format.mime_type()
                );
            }
            AudioOutcome::Failed(message) => {
                let _ = writeln!(html, "<p class=\"error\">{}</p>", escape_html(message));
            }
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}
