//! Tables of synthetic tissue instances and their reflectance spectra.
//!
//! A [`Batch`] stores, for `N` instances,
//!
//! - one `(N, 11)` parameter table per layer with the columns of
//!   [`LayerColumn`],
//! - the wavelengths of the reflectance columns (m), and
//! - an `(N, nr_wavelengths)` reflectance table.
//!
//! Every table has one row per instance. Batches fresh from a generator have
//! zero reflectance columns until simulated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use imc_optics::LayerParameters;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::SimError;
use crate::types::{normalize_thicknesses, TissueParameterSet};

/// Errors from batch construction, post-processing and persistence.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Target wavelength {target:.4e} outside source range [{min:.4e}, {max:.4e}]")]
    OutOfRange { target: f64, min: f64, max: f64 },

    #[error("Band index {index} out of range for {nr_bands} bands")]
    InvalidBand { index: usize, nr_bands: usize },

    #[error("Invalid band permutation: {0}")]
    InvalidPermutation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Per-layer parameter columns, in storage order. One column per
/// [`LayerParameters`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerColumn {
    #[serde(rename = "bvf")]
    Bvf,
    #[serde(rename = "saO2")]
    SaO2,
    #[serde(rename = "c_bili")]
    CBili,
    #[serde(rename = "a_ray")]
    ARay,
    #[serde(rename = "a_mie")]
    AMie,
    #[serde(rename = "b_mie")]
    BMie,
    #[serde(rename = "dsp")]
    Dsp,
    #[serde(rename = "r")]
    R,
    #[serde(rename = "d")]
    D,
    #[serde(rename = "n")]
    N,
    #[serde(rename = "g")]
    G,
}

impl LayerColumn {
    pub const ALL: [LayerColumn; 11] = [
        LayerColumn::Bvf,
        LayerColumn::SaO2,
        LayerColumn::CBili,
        LayerColumn::ARay,
        LayerColumn::AMie,
        LayerColumn::BMie,
        LayerColumn::Dsp,
        LayerColumn::R,
        LayerColumn::D,
        LayerColumn::N,
        LayerColumn::G,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayerColumn::Bvf => "bvf",
            LayerColumn::SaO2 => "saO2",
            LayerColumn::CBili => "c_bili",
            LayerColumn::ARay => "a_ray",
            LayerColumn::AMie => "a_mie",
            LayerColumn::BMie => "b_mie",
            LayerColumn::Dsp => "dsp",
            LayerColumn::R => "r",
            LayerColumn::D => "d",
            LayerColumn::N => "n",
            LayerColumn::G => "g",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    fn get(&self, p: &LayerParameters) -> f64 {
        match self {
            LayerColumn::Bvf => p.bvf,
            LayerColumn::SaO2 => p.sao2,
            LayerColumn::CBili => p.c_bili,
            LayerColumn::ARay => p.a_ray,
            LayerColumn::AMie => p.a_mie,
            LayerColumn::BMie => p.b_mie,
            LayerColumn::Dsp => p.dsp,
            LayerColumn::R => p.r,
            LayerColumn::D => p.d,
            LayerColumn::N => p.n,
            LayerColumn::G => p.g,
        }
    }
}

fn row_from_parameters(p: &LayerParameters) -> [f64; LayerColumn::COUNT] {
    LayerColumn::ALL.map(|c| c.get(p))
}

/// Synthetic tissue instances with optional reflectance spectra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub(crate) layers: Vec<Array2<f64>>,
    pub(crate) wavelengths: Array1<f64>,
    pub(crate) reflectances: Array2<f64>,
}

impl Batch {
    /// `nr_elements` zeroed instances of `nr_layers` layers, no spectra.
    pub fn zeros(nr_layers: usize, nr_elements: usize) -> Self {
        Self {
            layers: vec![Array2::zeros((nr_elements, LayerColumn::COUNT)); nr_layers],
            wavelengths: Array1::zeros(0),
            reflectances: Array2::zeros((nr_elements, 0)),
        }
    }

    /// Assemble a batch from its tables, checking all shapes.
    pub fn from_parts(
        layers: Vec<Array2<f64>>,
        wavelengths: Array1<f64>,
        reflectances: Array2<f64>,
    ) -> Result<Self, BatchError> {
        let batch = Self {
            layers,
            wavelengths,
            reflectances,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Batch holding the given parameter sets, no spectra.
    pub fn from_parameters(sets: &[TissueParameterSet]) -> Result<Self, BatchError> {
        let nr_layers = sets.first().map_or(0, |s| s.nr_layers());
        let mut batch = Self::zeros(nr_layers, sets.len());
        for (i, set) in sets.iter().enumerate() {
            batch.set_instance(i, set)?;
        }
        Ok(batch)
    }

    pub fn nr_elements(&self) -> usize {
        self.reflectances.nrows()
    }

    pub fn nr_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn nr_wavelengths(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn has_reflectances(&self) -> bool {
        self.nr_wavelengths() > 0
    }

    pub fn layers(&self) -> &[Array2<f64>] {
        &self.layers
    }

    pub fn wavelengths(&self) -> &Array1<f64> {
        &self.wavelengths
    }

    pub fn reflectances(&self) -> &Array2<f64> {
        &self.reflectances
    }

    /// One parameter column of one layer.
    pub fn column(&self, layer: usize, column: LayerColumn) -> Option<ArrayView1<'_, f64>> {
        self.layers.get(layer).map(|t| t.column(column.index()))
    }

    pub fn column_mut(
        &mut self,
        layer: usize,
        column: LayerColumn,
    ) -> Option<ArrayViewMut1<'_, f64>> {
        self.layers.get_mut(layer).map(|t| t.column_mut(column.index()))
    }

    /// Parameters of instance `i`.
    pub fn instance(&self, i: usize) -> Result<TissueParameterSet, BatchError> {
        self.check_row(i)?;
        let layers = self
            .layers
            .iter()
            .map(|t| {
                let r = t.row(i);
                let v = |c: LayerColumn| r[c.index()];
                LayerParameters {
                    bvf: v(LayerColumn::Bvf),
                    sao2: v(LayerColumn::SaO2),
                    c_bili: v(LayerColumn::CBili),
                    a_ray: v(LayerColumn::ARay),
                    a_mie: v(LayerColumn::AMie),
                    b_mie: v(LayerColumn::BMie),
                    dsp: v(LayerColumn::Dsp),
                    r: v(LayerColumn::R),
                    d: v(LayerColumn::D),
                    n: v(LayerColumn::N),
                    g: v(LayerColumn::G),
                }
            })
            .collect();
        Ok(TissueParameterSet::new(layers))
    }

    pub fn set_instance(&mut self, i: usize, set: &TissueParameterSet) -> Result<(), BatchError> {
        self.check_row(i)?;
        if set.nr_layers() != self.nr_layers() {
            return Err(BatchError::ShapeMismatch(format!(
                "instance has {} layers, batch has {}",
                set.nr_layers(),
                self.nr_layers()
            )));
        }
        for (table, p) in self.layers.iter_mut().zip(&set.layers) {
            for (dst, v) in table.row_mut(i).iter_mut().zip(row_from_parameters(p)) {
                *dst = v;
            }
        }
        Ok(())
    }

    /// Replace the spectra.
    pub fn set_reflectances(
        &mut self,
        wavelengths: Array1<f64>,
        reflectances: Array2<f64>,
    ) -> Result<(), BatchError> {
        if reflectances.dim() != (self.nr_elements(), wavelengths.len()) {
            return Err(BatchError::ShapeMismatch(format!(
                "reflectances {:?} for {} instances and {} wavelengths",
                reflectances.dim(),
                self.nr_elements(),
                wavelengths.len()
            )));
        }
        self.wavelengths = wavelengths;
        self.reflectances = reflectances;
        Ok(())
    }

    /// Check that every table has one row per instance.
    pub fn validate(&self) -> Result<(), BatchError> {
        let n = self.nr_elements();
        for (l, table) in self.layers.iter().enumerate() {
            if table.dim() != (n, LayerColumn::COUNT) {
                return Err(BatchError::ShapeMismatch(format!(
                    "layer {} table is {:?}, expected ({}, {})",
                    l,
                    table.dim(),
                    n,
                    LayerColumn::COUNT
                )));
            }
        }
        if self.reflectances.ncols() != self.wavelengths.len() {
            return Err(BatchError::ShapeMismatch(format!(
                "{} reflectance columns for {} wavelengths",
                self.reflectances.ncols(),
                self.wavelengths.len()
            )));
        }
        Ok(())
    }

    /// Copy of the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Batch, BatchError> {
        for &i in rows {
            self.check_row(i)?;
        }
        Ok(Batch {
            layers: self.layers.iter().map(|t| t.select(Axis(0), rows)).collect(),
            wavelengths: self.wavelengths.clone(),
            reflectances: self.reflectances.select(Axis(0), rows),
        })
    }

    /// Append the rows of `other`. Both batches must share layer count and
    /// wavelengths.
    pub fn append(&mut self, other: &Batch) -> Result<(), BatchError> {
        if self.nr_layers() != other.nr_layers() {
            return Err(BatchError::ShapeMismatch(format!(
                "cannot append {} layers to {}",
                other.nr_layers(),
                self.nr_layers()
            )));
        }
        if self.wavelengths != other.wavelengths {
            return Err(BatchError::ShapeMismatch(
                "cannot append batches with different wavelengths".into(),
            ));
        }
        let shape_err = |e: ndarray::ShapeError| BatchError::ShapeMismatch(e.to_string());
        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            mine.append(Axis(0), theirs.view()).map_err(shape_err)?;
        }
        self.reflectances
            .append(Axis(0), other.reflectances.view())
            .map_err(shape_err)?;
        Ok(())
    }

    /// Rescale the thickness column of every instance to sum to `total_m`,
    /// then floor each layer at `min_m`.
    pub fn normalize_thickness(&mut self, total_m: f64, min_m: f64) {
        let col = LayerColumn::D.index();
        let mut ds = vec![0.0; self.nr_layers()];
        for i in 0..self.nr_elements() {
            for (d, table) in ds.iter_mut().zip(&self.layers) {
                *d = table[[i, col]];
            }
            normalize_thicknesses(&mut ds, total_m, min_m);
            for (d, table) in ds.iter().zip(self.layers.iter_mut()) {
                table[[i, col]] = *d;
            }
        }
    }

    /// Per-instance sum of layer thicknesses (m).
    pub fn total_thickness(&self) -> Array1<f64> {
        let col = LayerColumn::D.index();
        let mut total = Array1::zeros(self.nr_elements());
        for table in &self.layers {
            total += &table.column(col);
        }
        total
    }

    pub fn save_json(&self, path: &Path) -> Result<(), BatchError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        log::info!(
            "Saved batch of {} instances to {}",
            self.nr_elements(),
            path.display()
        );
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, BatchError> {
        let reader = BufReader::new(File::open(path)?);
        let batch: Batch = serde_json::from_reader(reader)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Flat CSV export with `layer<i>.<column>` and `reflectance.<wavelength>`
    /// headers.
    pub fn write_csv(&self, path: &Path) -> Result<(), BatchError> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(
            w,
            "# imc batch: {} instances, {} layers, {} wavelengths",
            self.nr_elements(),
            self.nr_layers(),
            self.nr_wavelengths()
        )?;

        let mut header = Vec::new();
        for l in 0..self.nr_layers() {
            for c in LayerColumn::ALL {
                header.push(format!("layer{}.{}", l, c.name()));
            }
        }
        for wl in &self.wavelengths {
            header.push(format!("reflectance.{:.3e}", wl));
        }
        writeln!(w, "{}", header.join(","))?;

        for i in 0..self.nr_elements() {
            let mut fields = Vec::with_capacity(header.len());
            for table in &self.layers {
                fields.extend(table.row(i).iter().map(|v| format!("{:e}", v)));
            }
            fields.extend(self.reflectances.row(i).iter().map(|v| format!("{:e}", v)));
            writeln!(w, "{}", fields.join(","))?;
        }
        w.flush()?;
        Ok(())
    }

    /// Mean spectrum over all instances.
    pub fn mean_reflectance(&self) -> Option<Array1<f64>> {
        self.reflectances.mean_axis(Axis(0))
    }

    /// First `n` rows, or all of them if there are fewer.
    pub fn head(&self, n: usize) -> Batch {
        let n = n.min(self.nr_elements());
        Batch {
            layers: self.layers.iter().map(|t| t.slice(s![..n, ..]).to_owned()).collect(),
            wavelengths: self.wavelengths.clone(),
            reflectances: self.reflectances.slice(s![..n, ..]).to_owned(),
        }
    }

    fn check_row(&self, i: usize) -> Result<(), BatchError> {
        if i >= self.nr_elements() {
            return Err(BatchError::InvalidArgument(format!(
                "instance {} out of range for {} instances",
                i,
                self.nr_elements()
            )));
        }
        Ok(())
    }
}
