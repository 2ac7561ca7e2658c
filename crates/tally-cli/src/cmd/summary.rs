//! `tally summary`: dashboard totals.

use anyhow::Result;
use std::io::Write;
use tally_core::model::summary::dashboard;

use super::context::AppContext;
use crate::output::{money, pretty_kv, pretty_section, render};

/// # Errors
///
/// No active session, or a cache failure.
pub fn run_summary(ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let (account, summary) = orch.read(|l| (l.account().to_string(), dashboard(l.customers())));
    let out = ctx.output;
    render(out, &summary, |s, w| {
        if out.is_pretty() {
            pretty_section(w, &account)?;
            pretty_kv(w, "you will get", money(s.to_get))?;
            pretty_kv(w, "you will give", money(s.to_give))?;
            pretty_kv(w, "customers", s.customers.to_string())
        } else {
            writeln!(w, "{}\t{}\t{}", money(s.to_get), money(s.to_give), s.customers)
        }
    })
}
