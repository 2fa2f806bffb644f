//! Neuron preset listing

use clap::Args;
use izhnet_runtime::NeuronPreset;
use serde::Serialize;

use crate::error::CliResult;

/// List the built-in neuron presets
#[derive(Args, Debug)]
pub struct PresetsCommand {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// One preset as printed by `izhnet presets --json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetRow {
    /// Abbreviation accepted in config files, e.g. `RS`
    pub short: &'static str,
    /// Full preset name
    pub name: &'static str,
    /// Whether the preset models an excitatory cell
    pub excitatory: bool,
    /// Recovery time scale
    pub a: f32,
    /// Recovery sensitivity to the membrane potential
    pub b: f32,
    /// After-spike reset potential (mV)
    pub c: f32,
    /// After-spike recovery increment
    pub d: f32,
}

impl From<NeuronPreset> for PresetRow {
    fn from(preset: NeuronPreset) -> Self {
        let params = preset.params();
        Self {
            short: preset.short_name(),
            name: preset.long_name(),
            excitatory: preset.is_excitatory(),
            a: params.a,
            b: params.b,
            c: params.c,
            d: params.d,
        }
    }
}

impl PresetsCommand {
    pub fn execute(self) -> CliResult<()> {
        let rows: Vec<PresetRow> = NeuronPreset::ALL.iter().copied().map(PresetRow::from).collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        println!(
            "{:<5} {:<24} {:<5} {:>6} {:>6} {:>7} {:>6}",
            "NAME", "LONG NAME", "SIGN", "a", "b", "c", "d"
        );
        for row in &rows {
            let sign = if row.excitatory { "exc" } else { "inh" };
            println!(
                "{:<5} {:<24} {:<5} {:>6.3} {:>6.3} {:>7.1} {:>6.1}",
                row.short, row.name, sign, row.a, row.b, row.c, row.d
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_preset_table() {
        let rows: Vec<PresetRow> = NeuronPreset::ALL.iter().copied().map(PresetRow::from).collect();
        assert_eq!(rows.len(), 5);
        let fs = rows.iter().find(|r| r.short == "FS").unwrap();
        assert!(!fs.excitatory);
        assert_eq!(fs.a, 0.1);
        assert_eq!(rows.iter().filter(|r| r.excitatory).count(), 3);
    }
}
