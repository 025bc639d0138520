use anyhow::Result;
use curator_core::models::display_name_of;
use curator_core::session::SessionState;
use curator_core::store::{CategoryStore, Snapshot};
use curator_core::Category;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct Status {
    pub selected: usize,
    pub not_selected: usize,
    pub not_sure: usize,
    pub repaired: usize,
    pub session: Option<SessionState>,
}

impl Status {
    pub fn collect(store: &CategoryStore, session: Option<SessionState>) -> Self {
        Self {
            selected: store.count(Category::Yes),
            not_selected: store.count(Category::No),
            not_sure: store.count(Category::NotSure),
            repaired: store.load_report().repaired.len(),
            session,
        }
    }

    pub fn print<W: Write>(&self, json: bool, out: &mut W) -> Result<()> {
        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(self)?)?;
            return Ok(());
        }
        writeln!(
            out,
            "status: yes={}, no={}, not_sure={}",
            self.selected, self.not_selected, self.not_sure
        )?;
        if self.repaired > 0 {
            writeln!(out, "repaired {} conflicting entries on load", self.repaired)?;
        }
        match &self.session {
            Some(s) => writeln!(
                out,
                "session: {} at image {} (saved {})",
                s.source,
                s.index + 1,
                s.saved_at.to_rfc3339()
            )?,
            None => writeln!(out, "session: none")?,
        }
        Ok(())
    }
}

/// Lists the selected items in decision order.
pub fn review<W: Write>(snapshot: &Snapshot, out: &mut W) -> Result<()> {
    let selected = snapshot.get(Category::Yes);
    if selected.is_empty() {
        writeln!(out, "No selected images.")?;
        return Ok(());
    }
    for (i, id) in selected.iter().enumerate() {
        writeln!(
            out,
            "Image {} of {}: {}  ({})",
            i + 1,
            selected.len(),
            display_name_of(id),
            id
        )?;
    }
    Ok(())
}
