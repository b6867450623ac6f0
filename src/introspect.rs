//! Build configuration and capability introspection.
//!
//! Count-then-enumerate listings (packages, styles, IDs, plugins) re-query
//! the count inside the same method, so a listing is always sized by the
//! engine itself.

use std::collections::HashMap;

use crate::engine::Lammps;
use crate::error::{Error, Result};
use crate::ffi::cstring;

// id categories the engine enumerates; anything else is a caller mistake
const ID_CATEGORIES: &[&str] = &[
    "compute", "dump", "fix", "group", "molecule", "region", "variable",
];

const ACCEL_PACKAGES: &[&str] = &["GPU", "KOKKOS", "USER-INTEL", "USER-OMP"];
const ACCEL_CATEGORIES: &[(&str, &[&str])] = &[
    ("api", &["cuda", "hip", "phi", "pthreads", "opencl", "openmp", "serial"]),
    ("precision", &["double", "mixed", "single"]),
];

impl Lammps {
    /// Whether the engine library was built against MPI.
    #[must_use]
    pub fn has_mpi_support(&self) -> bool {
        self.api().mpi_support() != 0
    }

    /// Whether the engine build captures errors for the translation shim.
    /// Without it, engine failures terminate the process instead of
    /// surfacing as [`crate::Error`].
    #[must_use]
    pub fn has_exception_support(&self) -> bool {
        self.api().exceptions_enabled()
    }

    /// Whether the engine can read and write gzipped files.
    #[must_use]
    pub fn has_gzip_support(&self) -> bool {
        self.api().gzip_enabled()
    }

    /// Whether the engine can write PNG snapshots.
    #[must_use]
    pub fn has_png_support(&self) -> bool {
        self.api().png_enabled()
    }

    /// Whether the engine can write JPEG snapshots.
    #[must_use]
    pub fn has_jpeg_support(&self) -> bool {
        self.api().jpeg_enabled()
    }

    /// Whether the engine can pipe movie output through ffmpeg.
    #[must_use]
    pub fn has_ffmpeg_support(&self) -> bool {
        self.api().ffmpeg_enabled()
    }

    /// Names of the packages compiled into the engine library, sorted.
    #[must_use]
    pub fn installed_packages(&self) -> Vec<String> {
        let api = self.api();
        let mut names: Vec<String> = (0..api.package_count())
            .map(|i| api.package_name(i))
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names
    }

    /// Which accelerator settings each known accelerator package was built
    /// with, as `package -> category -> settings`.
    pub fn accelerator_config(&self) -> Result<HashMap<String, HashMap<String, Vec<String>>>> {
        let api = self.api();
        let mut config = HashMap::new();
        for package in ACCEL_PACKAGES {
            let cpackage = cstring(package)?;
            let mut categories = HashMap::new();
            for (category, settings) in ACCEL_CATEGORIES {
                let ccategory = cstring(category)?;
                let mut enabled = Vec::new();
                for setting in *settings {
                    if api.accelerator(&cpackage, &ccategory, &cstring(setting)?) {
                        enabled.push((*setting).to_string());
                    }
                }
                categories.insert((*category).to_string(), enabled);
            }
            config.insert((*package).to_string(), categories);
        }
        Ok(config)
    }

    /// Whether a style name exists within a category (`pair`, `fix`, ...).
    pub fn has_style(&self, category: &str, name: &str) -> Result<bool> {
        let ccategory = cstring(category)?;
        let cname = cstring(name)?;
        self.direct("has_style", |api, raw| {
            api.style_present(raw, &ccategory, &cname)
        })
    }

    /// All style names within a category, in engine order.
    pub fn available_styles(&self, category: &str) -> Result<Vec<String>> {
        let ccategory = cstring(category)?;
        self.direct("available_styles", |api, raw| {
            (0..api.styles_in(raw, &ccategory))
                .map(|i| api.style_at(raw, &ccategory, i))
                .filter(|n| !n.is_empty())
                .collect()
        })
    }

    /// Whether an instance with this ID exists within a category.
    ///
    /// # Errors
    ///
    /// [`Error::Operation`] for a category the engine does not enumerate.
    pub fn has_id(&self, category: &str, name: &str) -> Result<bool> {
        check_id_category(category)?;
        let ccategory = cstring(category)?;
        let cname = cstring(name)?;
        self.direct("has_id", |api, raw| api.id_present(raw, &ccategory, &cname))
    }

    /// All instance IDs within a category, in engine order.
    pub fn available_ids(&self, category: &str) -> Result<Vec<String>> {
        check_id_category(category)?;
        let ccategory = cstring(category)?;
        self.direct("available_ids", |api, raw| {
            (0..api.ids_in(raw, &ccategory))
                .map(|i| api.id_at(raw, &ccategory, i))
                .filter(|n| !n.is_empty())
                .collect()
        })
    }

    /// Loaded plugins as `(style, name)` pairs.
    #[must_use]
    pub fn available_plugins(&self) -> Vec<(String, String)> {
        let api = self.api();
        (0..api.plugins()).map(|i| api.plugin_at(i)).collect()
    }
}

fn check_id_category(category: &str) -> Result<()> {
    if ID_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(Error::operation(format!(
            "unknown id category {category:?} (expected one of {ID_CATEGORIES:?})"
        )))
    }
}
