//! The view layer: one-shot command handlers and an interactive shell. All
//! state lives in the session store; this module only renders it and invokes
//! auth operations.

use crate::audit::AuditLog;
use crate::auth::{AuthCore, AuthError};
use crate::session::{User, UserPatch};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;

pub struct Context {
    pub auth: RefCell<AuthCore>,
    pub audit: RefCell<Option<AuditLog>>,
    pub base_url: String,
}

/// Audit writes are best-effort; a full disk must not break a login.
fn audit<F>(ctx: &Context, f: F)
where
    F: FnOnce(&mut AuditLog) -> anyhow::Result<()>,
{
    if let Some(log) = ctx.audit.borrow_mut().as_mut() {
        let _ = f(log);
    }
}

fn prompt_password(prompt: &str) -> Result<String> {
    Ok(rpassword::prompt_password(prompt)?)
}

fn print_user(user: &User) {
    println!("  id:     {}", user.id);
    println!("  name:   {}", user.name);
    println!("  email:  {}", user.email);
    println!("  role:   {}", user.role.as_str());
    println!("  active: {}", user.is_active);
    if let Some(created) = user.created_at {
        println!("  joined: {}", created.format("%Y-%m-%d"));
    }
}

/// Auth failures are inline and recoverable, never fatal.
fn report(err: &AuthError) {
    eprintln!("Error: {}", err.message());
}

pub fn cmd_login(ctx: &Context, email: &str, password: Option<String>) -> Result<bool> {
    let password = match password {
        Some(p) => p,
        None => prompt_password("Password: ")?,
    };
    let result = ctx.auth.borrow_mut().login(email, &password);
    audit(ctx, |log| log.login(email, result.is_ok()));
    match result {
        Ok(user) => {
            println!("Signed in as {} <{}> ({})", user.name, user.email, user.role.as_str());
            Ok(true)
        }
        Err(e) => {
            report(&e);
            Ok(false)
        }
    }
}

pub fn cmd_logout(ctx: &Context) {
    ctx.auth.borrow_mut().logout();
    audit(ctx, |log| log.logout());
    println!("Signed out");
}

pub fn cmd_register(ctx: &Context, name: &str, email: &str) -> Result<bool> {
    let password = prompt_password("Password (min 6 characters): ")?;
    let confirm = prompt_password("Confirm password: ")?;
    let result = ctx.auth.borrow_mut().register(name, email, &password, &confirm);
    audit(ctx, |log| log.register(email, result.is_ok()));
    match result {
        Ok(()) => {
            println!("Account created. Sign in with: userctl login {}", email);
            Ok(true)
        }
        Err(e) => {
            report(&e);
            Ok(false)
        }
    }
}

pub fn cmd_whoami(ctx: &Context) -> bool {
    let auth = ctx.auth.borrow();
    match &auth.session().user {
        Some(user) => {
            println!("Signed in:");
            print_user(user);
            true
        }
        None => {
            println!("Not signed in");
            false
        }
    }
}

pub fn cmd_update(ctx: &Context, name: Option<String>, email: Option<String>) -> bool {
    let patch = UserPatch { name, email };
    let result = ctx.auth.borrow_mut().update_profile(&patch);
    match result {
        Ok(user) => {
            audit(ctx, |log| log.profile_update(&user.id, true));
            println!("Profile updated:");
            print_user(&user);
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

pub fn cmd_users_list(ctx: &Context) -> bool {
    match ctx.auth.borrow().list_users() {
        Ok(users) => {
            println!("{} user(s):", users.len());
            for user in users {
                let active = if user.is_active { "" } else { " (inactive)" };
                println!(
                    "  {}  {} <{}> [{}]{}",
                    user.id,
                    user.name,
                    user.email,
                    user.role.as_str(),
                    active
                );
            }
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

pub fn cmd_users_show(ctx: &Context, id: &str) -> bool {
    match ctx.auth.borrow().fetch_user(id) {
        Ok(user) => {
            print_user(&user);
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

pub fn cmd_users_delete(ctx: &Context, id: &str, yes: bool) -> Result<bool> {
    if !yes {
        println!("Delete user {}? This cannot be undone. [y/N]", id);
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(false);
        }
    }
    let result = ctx.auth.borrow_mut().delete_user(id);
    audit(ctx, |log| log.user_delete(id, result.is_ok()));
    match result {
        Ok(()) => {
            println!("User {} deleted", id);
            Ok(true)
        }
        Err(e) => {
            report(&e);
            Ok(false)
        }
    }
}

pub fn cmd_forgot_password(ctx: &Context, email: &str) -> bool {
    match ctx.auth.borrow().request_reset(email) {
        Ok(dev_link) => {
            // Uniform wording regardless of whether the email exists.
            println!("If your email exists in our system, you will receive a reset link.");
            if let Some(link) = dev_link {
                println!("Dev reset link: {}", link);
            }
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

pub fn cmd_reset_password(ctx: &Context, email: &str, token: &str) -> Result<bool> {
    // Check the token up front, as the original reset page did on load.
    match ctx.auth.borrow().verify_reset_token(token, email) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("Error: reset link is invalid or has expired");
            return Ok(false);
        }
        Err(e) => {
            report(&e);
            return Ok(false);
        }
    }

    let password = prompt_password("New password (min 6 characters): ")?;
    let confirm = prompt_password("Confirm new password: ")?;
    let result = ctx
        .auth
        .borrow()
        .confirm_reset(email, token, &password, &confirm);
    audit(ctx, |log| log.password_reset(email, result.is_ok()));
    match result {
        Ok(()) => {
            println!("Password reset. You can now sign in with: userctl login {}", email);
            Ok(true)
        }
        Err(e) => {
            report(&e);
            Ok(false)
        }
    }
}

pub fn run_shell(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("userctl - connected to {}", ctx.base_url);
    println!("Type 'help' for commands, 'exit' to quit");

    loop {
        match rl.readline("userctl> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match handle_command(&ctx, line) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Dispatch one shell command. Returns true when the shell should exit.
fn handle_command(ctx: &Context, cmd: &str) -> Result<bool> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts[0] {
        "exit" | "quit" => return Ok(true),
        "help" => {
            println!("Commands:");
            println!("  login <email>            - sign in (prompts for password)");
            println!("  logout                   - sign out");
            println!("  whoami                   - show the current session");
            println!("  register <email> <name>  - create an account");
            println!("  update name <value>      - change your display name");
            println!("  update email <value>     - change your email address");
            println!("  users                    - list all users (admin)");
            println!("  show <id>                - show one user");
            println!("  delete <id>              - delete a user (admin)");
            println!("  forgot <email>           - request a password reset");
            println!("  reset <email> <token>    - complete a password reset");
        }
        "login" if parts.len() == 2 => {
            cmd_login(ctx, parts[1], None)?;
        }
        "logout" => cmd_logout(ctx),
        "whoami" => {
            cmd_whoami(ctx);
        }
        "register" if parts.len() >= 3 => {
            let email = parts[1];
            let name = parts[2..].join(" ");
            cmd_register(ctx, &name, email)?;
        }
        "update" if parts.len() >= 3 => {
            let value = parts[2..].join(" ");
            match parts[1] {
                "name" => {
                    cmd_update(ctx, Some(value), None);
                }
                "email" => {
                    cmd_update(ctx, None, Some(value));
                }
                other => println!("Unknown field: {}. Use: name, email", other),
            }
        }
        "users" => {
            cmd_users_list(ctx);
        }
        "show" if parts.len() == 2 => {
            cmd_users_show(ctx, parts[1]);
        }
        "delete" if parts.len() == 2 => {
            cmd_users_delete(ctx, parts[1], false)?;
        }
        "forgot" if parts.len() == 2 => {
            cmd_forgot_password(ctx, parts[1]);
        }
        "reset" if parts.len() == 3 => {
            cmd_reset_password(ctx, parts[1], parts[2])?;
        }
        _ => println!("Unknown command: {}. Type 'help' for usage.", cmd),
    }
    Ok(false)
}
