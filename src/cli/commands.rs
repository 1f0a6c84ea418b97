use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use time::OffsetDateTime;

use super::Commands;
use crate::app::App;
use crate::backend::SignInRequest;
use crate::model::{ImageAttachment, ItemId, Quantity, UserIdentity};
use crate::pantry::expiry::parse_expiry;
use crate::pantry::{ExpiryStatus, Outcome, Pantry, PantryView};

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Account email address
    pub email: String,
    /// Display name shown in the TUI header
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Item name
    pub name: String,
    /// Quantity (numbers count towards the total)
    pub quantity: String,
    /// Expiry date as YYYY-MM-DD
    #[arg(long)]
    pub expires: Option<String>,
    /// Image file to attach
    #[arg(long)]
    pub image: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only show items whose name contains this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Item identifier as printed by `list`
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub quantity: Option<String>,
    /// New expiry date as YYYY-MM-DD, or an empty string to clear it
    #[arg(long)]
    pub expires: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Item identifier as printed by `list`
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct ListedItem<'a> {
    id: &'a str,
    name: &'a str,
    quantity: &'a Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_status: Option<ExpiryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    items: Vec<ListedItem<'a>>,
    total: f64,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

/// Runs a non-interactive command and returns what it prints.
pub fn execute(pantry: &mut Pantry, command: Commands, now: OffsetDateTime) -> Result<String> {
    match command {
        Commands::Tui => bail!("the TUI is not a one-shot command"),
        Commands::Login(args) => login(pantry, args),
        Commands::Logout => logout(pantry),
        Commands::Whoami => Ok(whoami(pantry)),
        Commands::Add(args) => add_item(pantry, args),
        Commands::List(args) => list_items(pantry, args, now),
        Commands::Edit(args) => edit_item(pantry, args),
        Commands::Remove(args) => remove_item(pantry, args),
        Commands::Clear(args) => clear_items(pantry, args),
    }
}

fn login(pantry: &mut Pantry, args: LoginArgs) -> Result<String> {
    let request = SignInRequest {
        email: args.email,
        display_name: args.name,
    };
    let user = pantry.sign_in(&request).context("signing in")?;
    Ok(format!("Signed in as {}\n", describe_user(&user)))
}

fn logout(pantry: &mut Pantry) -> Result<String> {
    if pantry.current_user().is_none() {
        return Ok("Not signed in.\n".to_string());
    }
    pantry.sign_out().context("signing out")?;
    Ok("Signed out.\n".to_string())
}

fn whoami(pantry: &Pantry) -> String {
    match pantry.current_user() {
        Some(user) => format!("{}\n", describe_user(user)),
        None => "Not signed in.\n".to_string(),
    }
}

fn add_item(pantry: &mut Pantry, args: AddArgs) -> Result<String> {
    require_user(pantry)?;
    let expiry_date = match args.expires {
        Some(text) => validate_expiry(&text)?,
        None => String::new(),
    };
    let image = match &args.image {
        Some(path) => Some(
            ImageAttachment::from_path(path)
                .with_context(|| format!("reading image {}", path.display()))?,
        ),
        None => None,
    };

    let edits = pantry.edits_mut();
    edits.cancel_add();
    edits.open_add();
    let draft = edits.add_draft_mut();
    draft.name = args.name;
    draft.quantity = args.quantity;
    draft.expiry_date = expiry_date;
    draft.image = image;

    match pantry.submit_add().context("adding item")? {
        Outcome::Applied(id) => {
            let name = pantry
                .find(id.as_str())
                .map(|item| item.name.clone())
                .unwrap_or_default();
            Ok(format!("Added {name} [{id}]\n"))
        }
        Outcome::Skipped(reason) => bail!("item not added: {reason}"),
    }
}

fn list_items(pantry: &mut Pantry, args: ListArgs, now: OffsetDateTime) -> Result<String> {
    require_user(pantry)?;
    pantry
        .edits_mut()
        .set_search(args.search.unwrap_or_default());
    let view = pantry.view(now);
    if args.json {
        render_json(&view)
    } else {
        Ok(format_items(&view))
    }
}

fn edit_item(pantry: &mut Pantry, args: EditArgs) -> Result<String> {
    require_user(pantry)?;
    if args.name.is_none() && args.quantity.is_none() && args.expires.is_none() {
        bail!("nothing to change; pass --name, --quantity or --expires");
    }
    let expiry_date = args.expires.as_deref().map(validate_expiry).transpose()?;
    let id = ItemId::new(args.id);
    if !pantry.begin_edit(&id) {
        bail!("no item with id {id}");
    }
    if let Some(draft) = pantry.edits_mut().edit_draft_mut() {
        if let Some(name) = args.name {
            draft.name = name;
        }
        if let Some(quantity) = args.quantity {
            draft.quantity = quantity;
        }
        if let Some(expiry_date) = expiry_date {
            draft.expiry_date = expiry_date;
        }
    }
    match pantry.submit_edit().context("saving item")? {
        Outcome::Applied(id) => Ok(format!("Updated [{id}]\n")),
        Outcome::Skipped(reason) => bail!("item not updated: {reason}"),
    }
}

fn remove_item(pantry: &mut Pantry, args: RemoveArgs) -> Result<String> {
    require_user(pantry)?;
    let id = ItemId::new(args.id);
    let Some(name) = pantry.find(id.as_str()).map(|item| item.name.clone()) else {
        bail!("no item with id {id}");
    };
    pantry.delete_item(&id).context("deleting item")?;
    Ok(format!("Removed {name} [{id}]\n"))
}

fn clear_items(pantry: &mut Pantry, args: ClearArgs) -> Result<String> {
    require_user(pantry)?;
    let count = pantry.items().len();
    if count == 0 {
        return Ok("Nothing to clear.\n".to_string());
    }
    if !args.yes {
        if !atty::is(atty::Stream::Stdin) {
            bail!("refusing to clear without --yes when stdin is not a terminal");
        }
        if !confirm(&format!("Delete all {count} item(s)?"))? {
            return Ok("Clear canceled.\n".to_string());
        }
    }
    pantry.edits_mut().open_clear_dialog();
    match pantry.clear_all().context("clearing items")? {
        Outcome::Applied(count) => Ok(format!("Cleared {count} item(s).\n")),
        Outcome::Skipped(reason) => bail!("nothing cleared: {reason}"),
    }
}

fn require_user(pantry: &Pantry) -> Result<&UserIdentity> {
    match pantry.current_user() {
        Some(user) => Ok(user),
        None => bail!("not signed in; run `pantry login <email>` first"),
    }
}

fn describe_user(user: &UserIdentity) -> String {
    match &user.display_name {
        Some(name) => format!("{name} <{}>", user.email),
        None => user.email.clone(),
    }
}

fn validate_expiry(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if !trimmed.is_empty() && parse_expiry(trimmed).is_none() {
        bail!("expiry date '{trimmed}' is not in YYYY-MM-DD form");
    }
    Ok(trimmed.to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

fn format_items(view: &PantryView<'_>) -> String {
    if view.rows.is_empty() {
        return if view.item_count == 0 {
            "Your pantry is empty.\n".to_string()
        } else {
            "No items match.\n".to_string()
        };
    }
    let mut out = String::new();
    for row in &view.rows {
        let mut line = format!("{}  × {}", row.item.name, row.quantity_text());
        if let Some(date) = row.item.expiry_date.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(&mut line, "  expires {date}");
            if let Some(status) = row.expiry {
                let _ = write!(&mut line, " ({status})");
            }
        }
        if row.item.image_url.is_some() {
            line.push_str("  [image]");
        }
        let _ = writeln!(&mut out, "{line}  [{}]", row.item.id);
    }
    let _ = writeln!(&mut out, "\nTotal quantity: {}", view.total_text());
    out
}

fn render_json(view: &PantryView<'_>) -> Result<String> {
    let output = ListOutput {
        items: view
            .rows
            .iter()
            .map(|row| ListedItem {
                id: row.item.id.as_str(),
                name: &row.item.name,
                quantity: &row.item.quantity,
                expiry_date: row.item.expiry_date.as_deref().filter(|d| !d.is_empty()),
                expiry_status: row.expiry,
                image_url: row.item.image_url.as_deref(),
            })
            .collect(),
        total: view.total,
    };
    let mut json = serde_json::to_string_pretty(&output).context("serializing item list")?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{Backend, MemoryAuthProvider, MemoryBlobStore, MemoryDocumentStore};
    use crate::pantry::PantrySettings;
    use time::macros::datetime;

    type TestResult<T = ()> = Result<T>;

    const NOW: OffsetDateTime = datetime!(2024-01-10 0:00 UTC);

    fn setup_pantry(signed_in: bool) -> TestResult<Pantry> {
        let auth = if signed_in {
            MemoryAuthProvider::signed_in("cook@example.com")?
        } else {
            MemoryAuthProvider::new()
        };
        let backend = Backend::new(
            Arc::new(auth),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        Ok(Pantry::new(backend, PantrySettings::default()))
    }

    fn add(name: &str, quantity: &str, expires: Option<&str>) -> Commands {
        Commands::Add(AddArgs {
            name: name.into(),
            quantity: quantity.into(),
            expires: expires.map(str::to_string),
            image: None,
        })
    }

    fn list(search: Option<&str>, json: bool) -> Commands {
        Commands::List(ListArgs {
            search: search.map(str::to_string),
            json,
        })
    }

    #[test]
    fn cli_list_prints_expiry_and_total() -> TestResult {
        let mut pantry = setup_pantry(true)?;
        execute(&mut pantry, add("milk", "2", Some("2024-01-10")), NOW)?;
        execute(&mut pantry, add("bread", "3", Some("2024-01-15")), NOW)?;
        execute(&mut pantry, add("rice", "1", None), NOW)?;

        let output = execute(&mut pantry, list(None, false), NOW)?;
        insta::assert_snapshot!(output.trim_end(), @r###"
        milk  × 2  expires 2024-01-10 (expired)  [doc-1]
        bread  × 3  expires 2024-01-15 (soon)  [doc-2]
        rice  × 1  [doc-3]

        Total quantity: 6
        "###);
        Ok(())
    }

    #[test]
    fn cli_list_search_keeps_full_total() -> TestResult {
        let mut pantry = setup_pantry(true)?;
        execute(&mut pantry, add("milk", "2", None), NOW)?;
        execute(&mut pantry, add("bread", "3", None), NOW)?;

        let output = execute(&mut pantry, list(Some("BREAD"), false), NOW)?;
        assert!(output.contains("bread"));
        assert!(!output.contains("milk"));
        assert!(output.contains("Total quantity: 5"));

        let output = execute(&mut pantry, list(Some("tea"), false), NOW)?;
        assert_eq!(output, "No items match.\n");
        Ok(())
    }

    #[test]
    fn cli_list_json_includes_status() -> TestResult {
        let mut pantry = setup_pantry(true)?;
        execute(&mut pantry, add("bread", "3", Some("2024-01-15")), NOW)?;
        let output = execute(&mut pantry, list(None, true), NOW)?;
        let value: serde_json::Value = serde_json::from_str(&output)?;
        assert_eq!(value["total"], serde_json::json!(3.0));
        assert_eq!(value["items"][0]["name"], "bread");
        assert_eq!(value["items"][0]["quantity"], "3");
        assert_eq!(value["items"][0]["expiry_status"], "soon");
        Ok(())
    }

    #[test]
    fn cli_commands_require_sign_in() -> TestResult {
        let mut pantry = setup_pantry(false)?;
        let err = execute(&mut pantry, add("milk", "2", None), NOW)
            .err()
            .map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("not signed in; run `pantry login <email>` first")
        );
        assert_eq!(execute(&mut pantry, Commands::Whoami, NOW)?, "Not signed in.\n");

        let output = execute(
            &mut pantry,
            Commands::Login(LoginArgs {
                email: "Cook@Example.com".into(),
                name: Some("Cook".into()),
            }),
            NOW,
        )?;
        assert_eq!(output, "Signed in as Cook <cook@example.com>\n");
        assert_eq!(execute(&mut pantry, Commands::Logout, NOW)?, "Signed out.\n");
        Ok(())
    }

    #[test]
    fn cli_add_rejects_bad_input() -> TestResult {
        let mut pantry = setup_pantry(true)?;
        assert!(execute(&mut pantry, add("milk", "2", Some("soon")), NOW).is_err());
        assert!(execute(&mut pantry, add("  ", "2", None), NOW).is_err());
        assert!(execute(&mut pantry, add("milk", "", None), NOW).is_err());
        assert!(pantry.items().is_empty());
        Ok(())
    }

    #[test]
    fn cli_edit_remove_and_clear() -> TestResult {
        let mut pantry = setup_pantry(true)?;
        execute(&mut pantry, add("milk", "2", None), NOW)?;
        execute(&mut pantry, add("bread", "3", None), NOW)?;

        let output = execute(
            &mut pantry,
            Commands::Edit(EditArgs {
                id: "doc-1".into(),
                name: None,
                quantity: Some("4".into()),
                expires: Some("2024-02-01".into()),
            }),
            NOW,
        )?;
        assert_eq!(output, "Updated [doc-1]\n");
        assert_eq!(pantry.total(), 7.0);
        assert!(execute(
            &mut pantry,
            Commands::Edit(EditArgs {
                id: "missing".into(),
                name: Some("x".into()),
                quantity: None,
                expires: None,
            }),
            NOW,
        )
        .is_err());

        let output = execute(
            &mut pantry,
            Commands::Remove(RemoveArgs { id: "doc-2".into() }),
            NOW,
        )?;
        assert_eq!(output, "Removed bread [doc-2]\n");

        let output = execute(&mut pantry, Commands::Clear(ClearArgs { yes: true }), NOW)?;
        assert_eq!(output, "Cleared 1 item(s).\n");
        assert_eq!(
            execute(&mut pantry, Commands::Clear(ClearArgs { yes: true }), NOW)?,
            "Nothing to clear.\n"
        );
        Ok(())
    }
}
