//! System Variance Controls
//!
//! Applies the `system` section once before plan execution and restores the
//! previous state once after it: ASLR, SMT, core boost and the frequency
//! governor through sysfs, CPU isolation through `cset shield`. Modeled as a
//! scoped guard so restoration happens on every exit path, panics and the
//! interrupt path included. Failure to apply aborts before any cell runs;
//! failure to restore is reported but does not change the exit status.

use crate::config::SystemSection;
use anyhow::{bail, Context, Result};
use benchalot_core::run_command;
use std::fs;
use std::path::{Path, PathBuf};

const ASLR_PATH: &str = "/proc/sys/kernel/randomize_va_space";
const SMT_PATH: &str = "/sys/devices/system/cpu/smt/control";
const BOOST_PATH: &str = "/sys/devices/system/cpu/cpufreq/boost";
const NO_TURBO_PATH: &str = "/sys/devices/system/cpu/intel_pstate/no_turbo";

/// Applied system modifications, restored on drop
pub struct SystemGuard {
    restores: Vec<Restore>,
}

enum Restore {
    /// Write `previous` back to `path`
    File { path: PathBuf, previous: String },
    /// Tear down the `cset` shield
    CpuShield,
}

impl SystemGuard {
    /// Apply the requested controls, capturing previous state for restore.
    ///
    /// On any failure the already-applied controls are rolled back before the
    /// error is returned, so a partially modified system never outlives the
    /// call.
    pub fn apply(section: &SystemSection) -> Result<SystemGuard> {
        let mut guard = SystemGuard {
            restores: Vec::new(),
        };
        tracing::info!("modifying system state");
        guard
            .try_apply(section)
            .context("cannot apply the 'system' section")?;
        Ok(guard)
    }

    fn try_apply(&mut self, section: &SystemSection) -> Result<()> {
        if section.disable_aslr {
            self.write_saved(Path::new(ASLR_PATH), "0")?;
        }
        if section.disable_smt {
            self.write_saved(Path::new(SMT_PATH), "off")?;
        }
        if section.disable_core_boost {
            // AMD and acpi-cpufreq expose `boost`; intel_pstate inverts the
            // sense with `no_turbo`
            if Path::new(BOOST_PATH).exists() {
                self.write_saved(Path::new(BOOST_PATH), "0")?;
            } else {
                self.write_saved(Path::new(NO_TURBO_PATH), "1")?;
            }
        }
        if section.governor_performance {
            for cpu in governed_cpus(section) {
                let path = PathBuf::from(format!(
                    "/sys/devices/system/cpu/cpu{}/cpufreq/scaling_governor",
                    cpu
                ));
                self.write_saved(&path, "performance")?;
            }
        }
        if !section.isolate_cpus.is_empty() {
            let cpus = section
                .isolate_cpus
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let command = format!("cset shield --cpu={} --kthread=on", cpus);
            let outcome = run_command(&command, None, &[])?;
            if !outcome.success() {
                bail!(
                    "cset shield failed (exit code {}): {}",
                    outcome.exit_code,
                    outcome.stderr.trim()
                );
            }
            self.restores.push(Restore::CpuShield);
        }
        Ok(())
    }

    /// Read a control file, remember its value and write the new one.
    fn write_saved(&mut self, path: &Path, value: &str) -> Result<()> {
        let previous = fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        fs::write(path, value).with_context(|| format!("cannot write '{}'", path.display()))?;
        tracing::debug!(path = %path.display(), value, "wrote system control");
        self.restores.push(Restore::File {
            path: path.to_path_buf(),
            previous,
        });
        Ok(())
    }
}

impl Drop for SystemGuard {
    fn drop(&mut self) {
        if self.restores.is_empty() {
            return;
        }
        tracing::info!("restoring system state");
        // Undo in reverse application order
        for restore in self.restores.drain(..).rev() {
            match restore {
                Restore::File { path, previous } => {
                    if let Err(err) = fs::write(&path, &previous) {
                        tracing::error!(
                            "failed to restore '{}' to its previous value: {}",
                            path.display(),
                            err
                        );
                    }
                }
                Restore::CpuShield => match run_command("cset shield --reset", None, &[]) {
                    Ok(outcome) if !outcome.success() => {
                        tracing::error!(
                            "cset shield --reset failed (exit code {})",
                            outcome.exit_code
                        );
                    }
                    Err(err) => tracing::error!("cset shield --reset failed: {}", err),
                    Ok(_) => {}
                },
            }
        }
    }
}

/// CPUs whose governor gets switched: the isolated set when one is declared,
/// otherwise every CPU.
fn governed_cpus(section: &SystemSection) -> Vec<u32> {
    if !section.isolate_cpus.is_empty() {
        return section.isolate_cpus.clone();
    }
    let count = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    (0..count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_section_is_a_no_op() {
        let section = SystemSection::default();
        assert!(!section.modifies_system());
        let guard = SystemGuard::apply(&section).unwrap();
        assert!(guard.restores.is_empty());
        drop(guard);
    }

    #[test]
    fn test_governed_cpus_prefer_isolated_set() {
        let section = SystemSection {
            isolate_cpus: vec![2, 3],
            governor_performance: true,
            ..SystemSection::default()
        };
        assert_eq!(governed_cpus(&section), vec![2, 3]);

        let all = governed_cpus(&SystemSection::default());
        assert!(!all.is_empty());
        assert_eq!(all[0], 0);
    }
}
