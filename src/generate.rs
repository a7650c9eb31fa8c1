//! Producing the engine package of a building.
//!
//! A package is copied from a precompiled file, copied from a live sibling building with the
//! same description hash, or generated by running the external generator on the description.
//! Whatever the source, success is judged by the package file existing afterwards.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use crate::{building::BuildingInstance, config::BuildingConfig, description::BuildingDescription, Error};

/// Turns a canonical description into a package file.
pub trait PackageGenerator {
    /// Generate `package` from the description file at `description`. The outcome is checked by
    /// the caller; a generator only fails here when it could not be run at all.
    fn generate(
        &self,
        config: &BuildingConfig,
        description: &Path,
        package: &Path,
    ) -> Result<(), Error>;
}

/// Runs the generator executable named by [`BuildingConfig::generator`]:
///
/// `<generator> --no-compress --output-path <package> --create <description>`
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandGenerator;

impl PackageGenerator for CommandGenerator {
    fn generate(
        &self,
        config: &BuildingConfig,
        description: &Path,
        package: &Path,
    ) -> Result<(), Error> {
        let fail = |reason: String| Error::Generation {
            building: config.name.clone(),
            reason,
        };
        let executable = config
            .generator
            .as_deref()
            .ok_or_else(|| fail("no package generator is configured".to_owned()))?;
        check_executable(executable).map_err(fail)?;

        log::debug!(
            "Running {executable:?} --no-compress --output-path {package:?} --create {description:?}"
        );
        let output = Command::new(executable)
            .arg("--no-compress")
            .arg("--output-path")
            .arg(package)
            .arg("--create")
            .arg(description)
            .output()
            .map_err(|err| fail(format!("failed to run {executable:?}: {err}")))?;

        if !output.status.success() {
            log::warn!(
                "Building '{}': generator exited with {}: {}",
                config.name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn check_executable(path: &Path) -> Result<(), String> {
    let meta = std::fs::metadata(path)
        .map_err(|err| format!("generator {path:?} is not accessible: {err}"))?;
    if !meta.is_file() {
        return Err(format!("generator {path:?} is not a file"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(format!("generator {path:?} is not executable"));
        }
    }
    Ok(())
}

/// Where a building's package comes from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PackageSource {
    Precompiled(PathBuf),
    Sibling { building: String, package: PathBuf },
    Generate,
}

/// Write the description and put the package in place. On success the building records the
/// description hash, which makes its package available to siblings.
pub(crate) fn prepare_package(
    building: &mut BuildingInstance,
    description: &BuildingDescription,
    source: PackageSource,
    generator: &dyn PackageGenerator,
) -> Result<(), Error> {
    let config = &building.config;
    let fail = |reason: String| Error::Generation {
        building: config.name.clone(),
        reason,
    };

    std::fs::create_dir_all(config.building_dir())?;
    let description_path = config.description_path();
    std::fs::write(&description_path, &description.document)?;

    let package = config.package_path();
    if package.is_dir() {
        std::fs::remove_dir_all(&package)?;
    } else if package.exists() {
        std::fs::remove_file(&package)?;
    }

    let mut reused_from = None;
    match source {
        PackageSource::Precompiled(precompiled) => {
            log::debug!(
                "Building '{}': copying precompiled package {precompiled:?}",
                config.name
            );
            std::fs::copy(&precompiled, &package).map_err(|err| {
                fail(format!("failed to copy precompiled package {precompiled:?}: {err}"))
            })?;
        }
        PackageSource::Sibling {
            building: sibling,
            package: source,
        } => {
            log::debug!(
                "Building '{}': reusing the package of building '{sibling}'",
                config.name
            );
            std::fs::copy(&source, &package).map_err(|err| {
                fail(format!("failed to copy the package of building '{sibling}': {err}"))
            })?;
            reused_from = Some(sibling);
        }
        PackageSource::Generate => {
            log::info!(
                "Building '{}': generating package {package:?}",
                config.name
            );
            generator.generate(config, &description_path, &package)?;
        }
    }

    if !package.exists() {
        return Err(fail(format!(
            "expected package {package:?} to exist after generation from {description_path:?}"
        )));
    }

    building.content_hash = Some(description.hash.clone());
    building.reused_from = reused_from;
    Ok(())
}
