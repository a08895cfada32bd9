//! Email templates for account linking
//!
//! Uses Handlebars for template rendering with variable substitution

use handlebars::Handlebars;
use serde_json::json;
use std::sync::Arc;

use super::email::OutgoingEmail;
use crate::{Error, Result};

pub const BIND_CONFIRMATION_SUBJECT: &str = "绑定您的电子邮箱";
pub const BIND_SUCCESS_SUBJECT: &str = "恭喜您绑定成功!";

/// Email template manager
#[derive(Clone)]
pub struct EmailTemplateManager {
    handlebars: Arc<Handlebars<'static>>,
}

impl std::fmt::Debug for EmailTemplateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailTemplateManager").finish_non_exhaustive()
    }
}

impl EmailTemplateManager {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        handlebars
            .register_template_string("bind_confirmation", BIND_CONFIRMATION_TEMPLATE)
            .map_err(|e| Error::Internal(format!("Failed to register bind confirmation template: {e}")))?;

        handlebars
            .register_template_string("bind_success", BIND_SUCCESS_TEMPLATE)
            .map_err(|e| Error::Internal(format!("Failed to register bind success template: {e}")))?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Email asking the user to confirm the address they typed in
    pub fn render_bind_confirmation(&self, to: &str, url: &str) -> Result<OutgoingEmail> {
        let html = self.render("bind_confirmation", &json!({ "url": url }))?;
        let text = format!(
            "请点击下面链接绑定您的邮箱\n\n{url}\n\n再次感谢您！\n如果上面链接无法打开，请将此链接复制至浏览器。"
        );
        Ok(email(to, BIND_CONFIRMATION_SUBJECT, html, text))
    }

    /// Email sent once the identity is linked
    pub fn render_bind_success(&self, to: &str, provider_name: &str, site_url: &str) -> Result<OutgoingEmail> {
        let data = json!({ "provider": provider_name, "url": site_url });
        let html = self.render("bind_success", &data)?;
        let text = format!(
            "恭喜您，您已经成功绑定您的邮箱，您可以使用{provider_name}来直接免密码登录本网站。\
             欢迎您继续关注本站，地址是\n\n{site_url}"
        );
        Ok(email(to, BIND_SUCCESS_SUBJECT, html, text))
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| Error::Internal(format!("Failed to render template: {e}")))
    }
}

fn email(to: &str, subject: &str, html_body: String, text_body: String) -> OutgoingEmail {
    OutgoingEmail {
        to: vec![to.to_string()],
        subject: subject.to_string(),
        html_body,
        text_body,
    }
}

const BIND_CONFIRMATION_TEMPLATE: &str = r#"
<!DOCTYPE html>
<html lang="zh-CN">
<head><meta charset="UTF-8"><title>绑定您的电子邮箱</title></head>
<body>
    <p>请点击下面链接绑定您的邮箱</p>

    <a href="{{url}}" rel="bookmark">{{url}}</a>

    再次感谢您！
    <br />
    如果上面链接无法打开，请将此链接复制至浏览器。
    {{url}}
</body>
</html>
"#;

const BIND_SUCCESS_TEMPLATE: &str = r#"
<!DOCTYPE html>
<html lang="zh-CN">
<head><meta charset="UTF-8"><title>恭喜您绑定成功!</title></head>
<body>
    <p>恭喜您，您已经成功绑定您的邮箱，您可以使用{{provider}}来直接免密码登录本网站.欢迎您继续关注本站，地址是</p>

    <a href="{{url}}" rel="bookmark">{{url}}</a>

    再次感谢您！
    <br />
    如果上面链接无法打开，请将此链接复制至浏览器。
    {{url}}
</body>
</html>
"#;
