//! Message content for verification templates
//!
//! Shared by the live and mock channels so tests see exactly what users do.

use crate::{DeliveryError, Template, TemplateData};

/// Rendered message bodies for one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub sms_text: String,
}

fn headline(template: Template) -> (&'static str, &'static str) {
    match template {
        Template::LoginCode => ("Your OpsDeck sign-in code", "sign in to OpsDeck"),
        Template::EmailVerification => ("Verify your OpsDeck email address", "verify your email address"),
        Template::PhoneVerification => ("Verify your OpsDeck phone number", "verify your phone number"),
        Template::PasswordReset => ("Reset your OpsDeck password", "reset your password"),
    }
}

/// Render `template`; `data` must carry `code`, and may carry `expires_in_minutes`
pub fn render(
    template: Template,
    data: &TemplateData,
    app_base_url: &str,
) -> Result<RenderedMessage, DeliveryError> {
    let code = data
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DeliveryError::Validation("template data is missing 'code'".to_string()))?;

    let expiry_line = match data.get("expires_in_minutes") {
        Some(minutes) => format!("This code expires in {} minutes.", minutes),
        None => "This code expires soon.".to_string(),
    };

    let (subject, action) = headline(template);

    let body_text = format!(
        "Hi there!\n\n\
        Use the code below to {}:\n\n\
        {}\n\n\
        {}\n\n\
        If you didn't request this, you can ignore this message.\n\n\
        {}\n\n\
        Thanks,\n\
        The OpsDeck Team",
        action, code, expiry_line, app_base_url
    );

    let body_html = format!(
        r#"
            <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2 style="color: #007cba;">{subject}</h2>

                    <p>Use the code below to {action}:</p>

                    <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold; text-align: center;">{code}</p>

                    <p style="color: #666; font-size: 14px;"><em>{expiry_line}</em></p>

                    <hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">

                    <p style="color: #666; font-size: 12px;">
                        If you didn't request this, you can ignore this message.<br>
                        <a href="{app_base_url}">{app_base_url}</a>
                    </p>
                </div>
            </body>
            </html>
            "#,
        subject = subject,
        action = action,
        code = code,
        expiry_line = expiry_line,
        app_base_url = app_base_url,
    );

    let sms_text = format!("OpsDeck: {} is your code to {}. {}", code, action, expiry_line);

    Ok(RenderedMessage {
        subject: subject.to_string(),
        body_text,
        body_html,
        sms_text,
    })
}
