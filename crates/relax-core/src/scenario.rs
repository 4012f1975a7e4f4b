//! Scenario tables: buses, branches, converters and injectors.

use std::collections::HashMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::capability::CapRegion;
use crate::cost::PwlFunction;
use crate::units::{Degrees, Kilovolts, MegavoltAmperes, Megavars, Megawatts, PerUnit};
use crate::{BranchId, BusId, ConverterId, InjectorId};

/// Default system base in MVA.
pub const DEFAULT_BASE_MVA: f64 = 100.0;

fn default_base_mva() -> f64 {
    DEFAULT_BASE_MVA
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    #[default]
    Ac,
    Dc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    #[default]
    Line,
    Transformer,
}

/// Bus (network node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub bus_type: BusType,
    /// Reference bus of its subgrid (phase anchor)
    pub is_ref: bool,
    pub base_kv: Kilovolts,
    /// Shunt admittance in p.u.
    pub y_tld: Complex64,
    /// Fixed load `P + jQ` in MW/Mvar
    pub load: Complex64,
    pub v_min: PerUnit,
    pub v_max: PerUnit,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId::new(0),
            bus_type: BusType::Ac,
            is_ref: false,
            base_kv: Kilovolts(110.0),
            y_tld: Complex64::new(0.0, 0.0),
            load: Complex64::new(0.0, 0.0),
            v_min: PerUnit(0.9),
            v_max: PerUnit(1.1),
        }
    }
}

impl Bus {
    pub fn new(id: usize) -> Self {
        Self {
            id: BusId::new(id),
            ..Self::default()
        }
    }

    pub fn is_dc(&self) -> bool {
        self.bus_type == BusType::Dc
    }
}

/// Branch (line or transformer) with the π-equivalent model.
///
/// At each end an ideal transformer with complex ratio `ρ` sits between the
/// terminal voltage `v` and the series element, which sees `ρ* v`. The
/// resulting terminal currents are
///
/// ```text
/// i_src = |ρ_src|² (y_src + y) v_src − ρ_src ρ_dst* y v_dst
/// i_dst = |ρ_dst|² (y_dst + y) v_dst − ρ_dst ρ_src* y v_src
/// ```
///
/// with series admittance `y = 1 / z_bar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub src: BusId,
    pub dst: BusId,
    /// Series impedance in p.u.
    pub z_bar: Complex64,
    /// Shunt admittance at the source side in p.u.
    pub y_src: Complex64,
    /// Shunt admittance at the destination side in p.u.
    pub y_dst: Complex64,
    pub rho_src: Complex64,
    pub rho_dst: Complex64,
    /// Thermal rating; `None` means unlimited
    pub rating: Option<MegavoltAmperes>,
    /// Bounds on `∠v_src − ∠v_dst`
    pub angle_min: Option<Degrees>,
    pub angle_max: Option<Degrees>,
    /// Bounds on the voltage drop `(|v_dst| − |v_src|) / |v_src|` in percent
    pub drop_min: Option<f64>,
    pub drop_max: Option<f64>,
    pub branch_type: BranchType,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId::new(0),
            src: BusId::new(0),
            dst: BusId::new(0),
            z_bar: Complex64::new(0.01, 0.1),
            y_src: Complex64::new(0.0, 0.0),
            y_dst: Complex64::new(0.0, 0.0),
            rho_src: Complex64::new(1.0, 0.0),
            rho_dst: Complex64::new(1.0, 0.0),
            rating: None,
            angle_min: None,
            angle_max: None,
            drop_min: None,
            drop_max: None,
            branch_type: BranchType::Line,
        }
    }
}

impl Branch {
    pub fn new(id: usize, src: usize, dst: usize) -> Self {
        Self {
            id: BranchId::new(id),
            src: BusId::new(src),
            dst: BusId::new(dst),
            ..Self::default()
        }
    }

    /// Series admittance `1 / z_bar`.
    pub fn y_bar(&self) -> Complex64 {
        self.z_bar.inv()
    }

    /// Total voltage ratio `ρ_src* ρ_dst`.
    ///
    /// At zero series current the angle difference `∠v_src − ∠v_dst` equals
    /// the negated phase of this ratio.
    pub fn total_ratio(&self) -> Complex64 {
        self.rho_src.conj() * self.rho_dst
    }

    /// Admittance coefficients of the terminal currents.
    pub fn admittance(&self) -> BranchAdmittance {
        let y = self.y_bar();
        BranchAdmittance {
            y_ss: self.rho_src.norm_sqr() * (self.y_src + y),
            y_sd: -self.rho_src * self.rho_dst.conj() * y,
            y_ds: -self.rho_dst * self.rho_src.conj() * y,
            y_dd: self.rho_dst.norm_sqr() * (self.y_dst + y),
        }
    }
}

/// `i_src = y_ss v_src + y_sd v_dst`, `i_dst = y_ds v_src + y_dd v_dst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub y_ss: Complex64,
    pub y_sd: Complex64,
    pub y_ds: Complex64,
    pub y_dd: Complex64,
}

impl BranchAdmittance {
    /// Complex power flowing into the branch at both ends.
    pub fn flows(&self, v_src: Complex64, v_dst: Complex64) -> (Complex64, Complex64) {
        let i_src = self.y_ss * v_src + self.y_sd * v_dst;
        let i_dst = self.y_ds * v_src + self.y_dd * v_dst;
        (v_src * i_src.conj(), v_dst * i_dst.conj())
    }
}

/// AC/DC or DC/DC converter.
///
/// Power is modelled by forward (`src → dst`) and backward (`dst → src`)
/// flows, each non-negative, with proportional losses in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Converter {
    pub id: ConverterId,
    pub src: BusId,
    pub dst: BusId,
    /// Loss of the forward flow in percent
    pub loss_fwd: f64,
    /// Loss of the backward flow in percent
    pub loss_bwd: f64,
    pub cap_src: CapRegion,
    pub cap_dst: CapRegion,
}

impl Converter {
    pub fn new(id: usize, src: usize, dst: usize, capacity_mw: f64) -> Self {
        Self {
            id: ConverterId::new(id),
            src: BusId::new(src),
            dst: BusId::new(dst),
            loss_fwd: 0.0,
            loss_bwd: 0.0,
            cap_src: CapRegion::active_only(-capacity_mw, capacity_mw),
            cap_dst: CapRegion::active_only(-capacity_mw, capacity_mw),
        }
    }

    /// Efficiency of the forward flow.
    pub fn eta_fwd(&self) -> f64 {
        1.0 - self.loss_fwd / 100.0
    }

    /// Efficiency of the backward flow.
    pub fn eta_bwd(&self) -> f64 {
        1.0 - self.loss_bwd / 100.0
    }
}

/// Generator, load or other controllable injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injector {
    pub id: InjectorId,
    pub bus: BusId,
    pub cap: CapRegion,
    /// Cost of active power in $/h over MW
    pub cost_p: Option<PwlFunction>,
    /// Cost of reactive power in $/h over Mvar
    pub cost_q: Option<PwlFunction>,
}

impl Injector {
    pub fn new(id: usize, bus: usize, cap: CapRegion) -> Self {
        Self {
            id: InjectorId::new(id),
            bus: BusId::new(bus),
            cap,
            cost_p: None,
            cost_q: None,
        }
    }

    pub fn with_cost_p(mut self, cost: PwlFunction) -> Self {
        self.cost_p = Some(cost);
        self
    }

    pub fn with_cost_q(mut self, cost: PwlFunction) -> Self {
        self.cost_q = Some(cost);
        self
    }
}

/// One steady-state OPF scenario.
///
/// Built wholesale from external input and consumed read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
    /// Price of losses in $/MWh
    #[serde(default)]
    pub loss_price: f64,
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub converters: Vec<Converter>,
    pub injectors: Vec<Injector>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_mva: DEFAULT_BASE_MVA,
            loss_price: 0.0,
            buses: Vec::new(),
            branches: Vec::new(),
            converters: Vec::new(),
            injectors: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Map from bus ID to row index. Duplicate IDs keep the first row.
    pub fn bus_index_map(&self) -> HashMap<BusId, usize> {
        let mut map = HashMap::with_capacity(self.buses.len());
        for (idx, bus) in self.buses.iter().enumerate() {
            map.entry(bus.id).or_insert(idx);
        }
        map
    }

    /// Total fixed load.
    pub fn total_load(&self) -> (Megawatts, Megavars) {
        let sum: Complex64 = self.buses.iter().map(|b| b.load).sum();
        (Megawatts(sum.re), Megavars(sum.im))
    }

    pub fn has_dc_buses(&self) -> bool {
        self.buses.iter().any(Bus::is_dc)
    }
}
