// ============================
// crates/portal-lib/src/views.rs
// ============================
//! HTML pages.
//!
//! Every dynamic value goes through [`escape`].

use crate::auth::Flash;

/// Escape text for HTML element content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn messages(flashes: &[Flash], errors: &[String]) -> String {
    let mut html = String::new();
    for flash in flashes {
        html.push_str(&format!(
            "<p class=\"flash flash-{}\">{}</p>\n",
            flash.level.as_str(),
            escape(&flash.message)
        ));
    }
    for error in errors {
        html.push_str(&format!("<p class=\"flash flash-error\">{}</p>\n", escape(error)));
    }
    html
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} - TrueNAS Password Portal</title>\n</head>\n<body>\n<main>\n\
         <h1>{title}</h1>\n{body}</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

pub fn login_page(flashes: &[Flash], errors: &[String], username: &str) -> String {
    let body = format!(
        "{messages}<form method=\"post\" action=\"/login\">\n\
         <label for=\"username\">Username</label>\n\
         <input id=\"username\" name=\"username\" type=\"text\" value=\"{username}\" \
         maxlength=\"64\" autocomplete=\"username\" required autofocus>\n\
         <label for=\"password\">Password</label>\n\
         <input id=\"password\" name=\"password\" type=\"password\" \
         autocomplete=\"current-password\" required>\n\
         <button type=\"submit\">Log in</button>\n</form>\n",
        messages = messages(flashes, errors),
        username = escape(username),
    );
    layout("Log in", &body)
}

pub fn change_password_page(username: &str, flashes: &[Flash], errors: &[String]) -> String {
    let body = format!(
        "<p>Logged in as <strong>{username}</strong> (<a href=\"/logout\">log out</a>)</p>\n\
         {messages}<form method=\"post\" action=\"/change-password\">\n\
         <label for=\"current_password\">Current Password</label>\n\
         <input id=\"current_password\" name=\"current_password\" type=\"password\" \
         autocomplete=\"current-password\" required>\n\
         <label for=\"new_password\">New Password</label>\n\
         <input id=\"new_password\" name=\"new_password\" type=\"password\" \
         autocomplete=\"new-password\" required>\n\
         <label for=\"confirm_password\">Confirm New Password</label>\n\
         <input id=\"confirm_password\" name=\"confirm_password\" type=\"password\" \
         autocomplete=\"new-password\" required>\n\
         <button type=\"submit\">Change password</button>\n</form>\n",
        username = escape(username),
        messages = messages(flashes, errors),
    );
    layout("Change Password", &body)
}
