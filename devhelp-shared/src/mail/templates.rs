/// HTML templates for transactional mail
///
/// Values interpolated into the markup are HTML-escaped.

use super::EmailMessage;

const BRAND: &str = "devHelp";
const ACCENT: &str = "#2563eb";

/// Escapes the five HTML-significant characters
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(heading: &str, body: &str, footer: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: {ACCENT};">{heading}</h2>
    {body}
    <hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;" />
    <p style="font-size: 12px; color: #999;">{footer}</p>
    <p style="font-size: 12px; color: #999;">&copy; {BRAND}. All rights reserved.</p>
  </div>
</body>
</html>"#
    )
}

fn button(href: &str, label: &str) -> String {
    format!(
        r#"<p style="margin: 30px 0;"><a href="{href}" style="background-color: {ACCENT}; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px; display: inline-block;">{label}</a></p>"#
    )
}

pub struct CompanyInvite<'a> {
    pub to: &'a str,
    pub first_name: &'a str,
    pub inviter_name: &'a str,
    pub company_name: &'a str,
    pub invite_link: &'a str,
    pub expires_in_days: i64,
}

pub fn company_invite(ctx: &CompanyInvite<'_>) -> EmailMessage {
    let company = escape(ctx.company_name);
    let inviter = escape(ctx.inviter_name);
    let link = escape(ctx.invite_link);

    let body = format!(
        "<p>Hi <strong>{first}</strong>,</p>\
         <p><strong>{inviter}</strong> has invited you to join <strong>{company}</strong> on <strong>{BRAND}</strong>.</p>\
         {button}\
         <p style=\"color: #666; font-size: 14px;\">This invitation will expire in <strong>{days} days</strong>.</p>",
        first = escape(ctx.first_name),
        button = button(&link, "Accept Invitation"),
        days = ctx.expires_in_days,
    );

    EmailMessage {
        to: ctx.to.to_string(),
        subject: format!("{} invited you to join {} on {BRAND}", ctx.inviter_name, ctx.company_name),
        html: layout(
            &format!("You're Invited to Join {company}!"),
            &body,
            &format!("Need help? Reply to this email or contact {inviter}."),
        ),
    }
}

pub struct ResetPassword<'a> {
    pub to: &'a str,
    pub first_name: &'a str,
    pub company_name: &'a str,
    pub reset_link: &'a str,
}

pub fn reset_password(ctx: &ResetPassword<'_>) -> EmailMessage {
    let link = escape(ctx.reset_link);

    let body = format!(
        "<p>Hi <strong>{first}</strong>,</p>\
         <p>We received a request to reset your password for your account at <strong>{company}</strong>.</p>\
         <p>This link is valid for <strong>1 hour</strong>.</p>\
         {button}\
         <p style=\"color: #666; font-size: 14px;\">Or copy and paste this URL into your browser:<br />{link}</p>\
         <p style=\"font-size: 14px; color: #666;\"><strong>Security Note:</strong> If you didn't request a password reset, you can safely ignore this email.</p>",
        first = escape(ctx.first_name),
        company = escape(ctx.company_name),
        button = button(&link, "Reset Password"),
    );

    EmailMessage {
        to: ctx.to.to_string(),
        subject: format!("Reset Your Password - {BRAND}"),
        html: layout("Reset Your Password", &body, "Need help? Reply to this email or contact support."),
    }
}

pub struct PasswordChanged<'a> {
    pub to: &'a str,
    pub first_name: &'a str,
    pub company_name: &'a str,
    pub login_link: &'a str,
    /// Human-readable time of the change
    pub changed_at: &'a str,
}

pub fn password_changed(ctx: &PasswordChanged<'_>) -> EmailMessage {
    let body = format!(
        "<p>Hi <strong>{first}</strong>,</p>\
         <p>This email is to confirm that the password for your account at <strong>{company}</strong> was successfully changed.</p>\
         <p><strong>Time of change:</strong> {when}</p>\
         {button}\
         <p style=\"font-size: 14px; color: #d93025;\"><strong>Security Warning:</strong> If you did NOT perform this change, please contact our support team immediately.</p>",
        first = escape(ctx.first_name),
        company = escape(ctx.company_name),
        when = escape(ctx.changed_at),
        button = button(&escape(ctx.login_link), "Login to Dashboard"),
    );

    EmailMessage {
        to: ctx.to.to_string(),
        subject: format!("Your Password Was Changed - {BRAND}"),
        html: layout("Password Changed Successfully", &body, "Need help? Reply to this email."),
    }
}

pub struct Welcome<'a> {
    pub to: &'a str,
    pub first_name: &'a str,
    pub company_name: &'a str,
    pub dashboard_link: &'a str,
}

pub fn welcome(ctx: &Welcome<'_>) -> EmailMessage {
    let company = escape(ctx.company_name);

    let body = format!(
        "<p>Hi <strong>{first}</strong>,</p>\
         <p>Your account at <strong>{company}</strong> is active. You can sign in any time.</p>\
         {button}",
        first = escape(ctx.first_name),
        button = button(&escape(ctx.dashboard_link), "Go to Dashboard"),
    );

    EmailMessage {
        to: ctx.to.to_string(),
        subject: format!("Welcome to {}!", ctx.company_name),
        html: layout(&format!("Welcome to {company}!"), &body, "Need help? Reply to this email."),
    }
}
