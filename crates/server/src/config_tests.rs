// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::*;

fn parse(args: &[&str]) -> anyhow::Result<Config> {
    let mut full = vec!["canopy"];
    full.extend_from_slice(args);
    Config::try_parse_from(full).map_err(anyhow::Error::new)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&[])?;
    config.validate()?;
    assert_eq!(config.port, 7420);
    assert_eq!(config.ring_capacity, 5000);
    assert_eq!(config.main_queue_capacity, 10);
    assert_eq!(config.provider_kind(), ProviderKind::Null);
    Ok(())
}

#[test]
fn unknown_provider_is_rejected() -> anyhow::Result<()> {
    let config = parse(&["--provider", "frobnicator"])?;
    assert!(config.validate().is_err());
    Ok(())
}

#[test]
fn agentd_requires_a_command() -> anyhow::Result<()> {
    let config = parse(&["--provider", "agentd"])?;
    assert!(config.validate().is_err());
    let config = parse(&["--provider", "agentd", "--", "agentd", "--stdio"])?;
    config.validate()?;
    assert_eq!(config.provider_command, vec!["agentd", "--stdio"]);
    Ok(())
}

#[test]
fn zero_capacities_are_rejected() -> anyhow::Result<()> {
    assert!(parse(&["--ring-capacity", "0"])?.validate().is_err());
    assert!(parse(&["--main-queue-capacity", "0"])?.validate().is_err());
    assert!(parse(&["--agent-limit", "0"])?.validate().is_err());
    Ok(())
}

#[test]
fn bad_log_format_is_rejected() -> anyhow::Result<()> {
    assert!(parse(&["--log-format", "xml"])?.validate().is_err());
    Ok(())
}
