//! Server-rendered HTML pages for the login flow

use axum::response::Html;
use blogsite_core::service::Notice;
use handlebars::Handlebars;
use serde_json::json;
use std::sync::Arc;

use super::AppError;

#[derive(Clone)]
pub struct PageRenderer {
    handlebars: Arc<Handlebars<'static>>,
}

impl PageRenderer {
    pub fn new() -> anyhow::Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_template_string("result", RESULT_TEMPLATE)?;
        handlebars.register_template_string("require_email", REQUIRE_EMAIL_TEMPLATE)?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Title-and-message page
    pub fn notice(&self, notice: &Notice) -> Result<Html<String>, AppError> {
        self.render("result", &json!({ "title": notice.title, "content": notice.content }))
    }

    /// Form asking for the email the provider withheld
    pub fn require_email(&self, form_url: &str, email: &str, error: Option<&str>) -> Result<Html<String>, AppError> {
        self.render(
            "require_email",
            &json!({
                "form_url": form_url,
                "email": email,
                "error": error.unwrap_or_default(),
            }),
        )
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Html<String>, AppError> {
        self.handlebars.render(name, data).map(Html).map_err(|e| {
            tracing::error!("Failed to render page {}: {}", name, e);
            AppError::internal_server_error("Internal server error")
        })
    }
}

const RESULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{title}}</title>
</head>
<body>
    <main class="result">
        <h2>{{title}}</h2>
        <p>{{content}}</p>
        <a href="/">返回首页</a>
    </main>
</body>
</html>
"#;

const REQUIRE_EMAIL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>补全邮箱</title>
</head>
<body>
    <main class="auth">
        <h2>补全邮箱</h2>
        {{#if error}}<p class="error">{{error}}</p>{{/if}}
        <form method="post" action="{{form_url}}">
            <label for="email">电子邮箱</label>
            <input id="email" name="email" type="email" value="{{email}}" required>
            <button type="submit">提交</button>
        </form>
    </main>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_page_escapes_content() {
        let pages = PageRenderer::new().unwrap();
        let notice = Notice {
            title: "绑定成功".to_string(),
            content: "<script>x</script>".to_string(),
        };
        let Html(body) = pages.notice(&notice).unwrap();
        assert!(body.contains("<h2>绑定成功</h2>"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn test_require_email_form() {
        let pages = PageRenderer::new().unwrap();
        let Html(body) = pages
            .require_email("/oauth/require_email/abc/", "", Some("邮箱格式不正确"))
            .unwrap();
        assert!(body.contains(r#"action="/oauth/require_email/abc/""#));
        assert!(body.contains("邮箱格式不正确"));

        let Html(body) = pages.require_email("/oauth/require_email/abc/", "", None).unwrap();
        assert!(!body.contains("class=\"error\""));
    }
}
