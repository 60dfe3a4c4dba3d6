//! Settings-to-pipeline compiler.
//!
//! [`plan`] turns a [`Settings`] value into an ordered list of typed
//! [`Stage`]s. It performs no I/O and reads no clock: file names that
//! depend on the capture time are resolved later by the executor, so the
//! same settings always produce an identical plan.
//!
//! Each field is evaluated independently:
//!
//! | Decision | Rule |
//! |---|---|
//! | geometry | `a4`/`legal`/`max` from the table, anything else the device default |
//! | resolution | 300 dpi for `jpg`, otherwise 200 dpi |
//! | crop / deskew | present iff the flag is set |
//! | color profiles | always source-device → reference |
//! | normalize | iff mode is `pdf` |
//! | routing | `pdf` stages pages privately and aggregates; otherwise pages go straight to the output directory |

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{
    A4_GEOMETRY, ADF_SOURCE, COLOR_MODE, DEFAULT_RESOLUTION, JPG_RESOLUTION, LEGAL_GEOMETRY,
    MAX_GEOMETRY,
};
use crate::settings::{PageSize, ScanMode, Settings};

/// Page framing for the acquisition tool, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Physical page width.
    pub page_width: f64,
    /// Physical page height.
    pub page_height: f64,
    /// Width of the scanned area.
    pub scan_width: f64,
    /// Height of the scanned area.
    pub scan_height: f64,
}

impl Geometry {
    const fn from_table(row: [f64; 4]) -> Self {
        Self {
            page_width: row[0],
            page_height: row[1],
            scan_width: row[2],
            scan_height: row[3],
        }
    }

    /// Geometry override for a page size, `None` meaning the device default.
    pub fn for_size(size: PageSize) -> Option<Self> {
        match size {
            PageSize::A4 => Some(Self::from_table(A4_GEOMETRY)),
            PageSize::Legal => Some(Self::from_table(LEGAL_GEOMETRY)),
            PageSize::Max => Some(Self::from_table(MAX_GEOMETRY)),
            PageSize::Letter => None,
        }
    }
}

/// Identifier of an ICC color profile, resolved to a file by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileId {
    /// Profile describing the scanner's native color response.
    SourceDevice,
    /// Reference profile the output is converted into.
    TargetReference,
}

impl ProfileId {
    /// Stable name used in logs and flat parameter views.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceDevice => "source-device",
            Self::TargetReference => "target-reference",
        }
    }
}

/// Where adjusted pages are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRoute {
    /// Private per-job staging directory, to be aggregated afterwards.
    Staging,
    /// Straight into the persistent output directory, one file per page.
    OutputDirectory,
}

/// Parameters of the acquisition stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireParams {
    /// Feeder source name.
    pub source: &'static str,
    /// Color mode name.
    pub color_mode: &'static str,
    /// Resolution in dpi.
    pub resolution: u32,
    /// Page framing, `None` for the device default.
    pub geometry: Option<Geometry>,
}

/// Parameters applied identically to every captured page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustParams {
    /// Trim borders.
    pub crop: bool,
    /// Straighten.
    pub deskew: bool,
    /// Profiles of the color transform, in application order.
    pub profiles: [ProfileId; 2],
    /// Stretch contrast.
    pub normalize: bool,
    /// Where the adjusted page goes.
    pub route: OutputRoute,
}

/// Parameters of the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateParams {
    /// The document lands in the persistent output directory, named by the
    /// capture timestamp.
    pub route: OutputRoute,
}

/// Kind of a plan stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Feed pages through the device.
    Acquire,
    /// Adjust each captured page.
    PerImageAdjust,
    /// Combine staged pages into one document.
    Aggregate,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Acquire => "Acquire",
            Self::PerImageAdjust => "PerImageAdjust",
            Self::Aggregate => "Aggregate",
        })
    }
}

/// One step of a plan with its resolved parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Acquisition.
    Acquire(AcquireParams),
    /// Per-page adjustment.
    PerImageAdjust(AdjustParams),
    /// Aggregation.
    Aggregate(AggregateParams),
}

impl Stage {
    /// Kind of this stage.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Acquire(_) => StageKind::Acquire,
            Self::PerImageAdjust(_) => StageKind::PerImageAdjust,
            Self::Aggregate(_) => StageKind::Aggregate,
        }
    }

    /// Flat key/value view of the planning decisions, for logging.
    pub fn parameters(&self) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        match self {
            Self::Acquire(p) => {
                params.insert("source", p.source.to_string());
                params.insert("color_mode", p.color_mode.to_string());
                params.insert("resolution", p.resolution.to_string());
                match p.geometry {
                    Some(g) => {
                        params.insert("page_width", g.page_width.to_string());
                        params.insert("page_height", g.page_height.to_string());
                        params.insert("scan_width", g.scan_width.to_string());
                        params.insert("scan_height", g.scan_height.to_string());
                    }
                    None => {
                        params.insert("geometry", "default".to_string());
                    }
                }
            }
            Self::PerImageAdjust(p) => {
                params.insert("crop", p.crop.to_string());
                params.insert("deskew", p.deskew.to_string());
                params.insert("normalize", p.normalize.to_string());
                params.insert(
                    "profiles",
                    format!("{},{}", p.profiles[0].as_str(), p.profiles[1].as_str()),
                );
                params.insert("output", route_name(p.route).to_string());
            }
            Self::Aggregate(p) => {
                params.insert("output", route_name(p.route).to_string());
            }
        }
        params
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.kind())?;
        for (i, (key, value)) in self.parameters().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        f.write_str("}")
    }
}

fn route_name(route: OutputRoute) -> &'static str {
    match route {
        OutputRoute::Staging => "staging",
        OutputRoute::OutputDirectory => "output-directory",
    }
}

/// Ordered list of stages fully determined by a `Settings` value.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    stages: Vec<Stage>,
}

impl Plan {
    /// Stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Acquisition parameters.
    pub fn acquire(&self) -> Option<&AcquireParams> {
        self.stages.iter().find_map(|s| match s {
            Stage::Acquire(p) => Some(p),
            _ => None,
        })
    }

    /// Per-page adjustment parameters.
    pub fn adjust(&self) -> Option<&AdjustParams> {
        self.stages.iter().find_map(|s| match s {
            Stage::PerImageAdjust(p) => Some(p),
            _ => None,
        })
    }

    /// Aggregation parameters, if pages are combined into one document.
    pub fn aggregate(&self) -> Option<&AggregateParams> {
        self.stages.iter().find_map(|s| match s {
            Stage::Aggregate(p) => Some(p),
            _ => None,
        })
    }
}

impl IntoIterator for Plan {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

/// Compiles settings into a plan.
pub fn plan(settings: &Settings) -> Plan {
    let pdf = settings.mode == Some(ScanMode::Pdf);
    let jpg = settings.mode == Some(ScanMode::Jpg);

    let acquire = AcquireParams {
        source: ADF_SOURCE,
        color_mode: COLOR_MODE,
        resolution: if jpg { JPG_RESOLUTION } else { DEFAULT_RESOLUTION },
        geometry: Geometry::for_size(settings.size),
    };

    let route = if pdf {
        OutputRoute::Staging
    } else {
        OutputRoute::OutputDirectory
    };

    let adjust = AdjustParams {
        crop: settings.crop,
        deskew: settings.deskew,
        profiles: [ProfileId::SourceDevice, ProfileId::TargetReference],
        normalize: pdf,
        route,
    };

    let mut stages = vec![Stage::Acquire(acquire), Stage::PerImageAdjust(adjust)];
    if pdf {
        stages.push(Stage::Aggregate(AggregateParams {
            route: OutputRoute::OutputDirectory,
        }));
    }

    Plan { stages }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(frame: &str) -> Settings {
        Settings::parse(frame).unwrap()
    }

    #[test]
    fn test_jpg_plan() {
        let p = plan(&settings(
            "('size' => 'a4', 'mode' => 'jpg', 'crop' => 1, 'deskew' => 0)",
        ));
        let kinds: Vec<_> = p.stages().iter().map(Stage::kind).collect();
        assert_eq!(kinds, vec![StageKind::Acquire, StageKind::PerImageAdjust]);

        let acquire = p.acquire().unwrap();
        assert_eq!(acquire.resolution, 300);
        assert_eq!(acquire.geometry, Some(Geometry::from_table(A4_GEOMETRY)));

        let adjust = p.adjust().unwrap();
        assert!(adjust.crop);
        assert!(!adjust.deskew);
        assert!(!adjust.normalize);
        assert_eq!(
            adjust.profiles,
            [ProfileId::SourceDevice, ProfileId::TargetReference]
        );
        assert_eq!(adjust.route, OutputRoute::OutputDirectory);
        assert!(p.aggregate().is_none());
    }

    #[test]
    fn test_pdf_plan() {
        let p = plan(&settings(
            "('size' => 'letter', 'mode' => 'pdf', 'crop' => 0, 'deskew' => 1)",
        ));
        let kinds: Vec<_> = p.stages().iter().map(Stage::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Acquire,
                StageKind::PerImageAdjust,
                StageKind::Aggregate
            ]
        );

        assert_eq!(p.acquire().unwrap().resolution, 200);
        assert_eq!(p.acquire().unwrap().geometry, None);

        let adjust = p.adjust().unwrap();
        assert!(!adjust.crop);
        assert!(adjust.deskew);
        assert!(adjust.normalize);
        assert_eq!(adjust.route, OutputRoute::Staging);
        assert_eq!(
            p.aggregate().unwrap().route,
            OutputRoute::OutputDirectory
        );
    }

    #[test]
    fn test_empty_settings_plan() {
        let p = plan(&settings("()"));
        assert_eq!(p.stages().len(), 2);
        assert_eq!(p.acquire().unwrap().resolution, 200);
        assert_eq!(p.acquire().unwrap().geometry, None);

        let adjust = p.adjust().unwrap();
        assert!(!adjust.crop);
        assert!(!adjust.deskew);
        assert!(!adjust.normalize);
        assert_eq!(adjust.route, OutputRoute::OutputDirectory);
    }

    #[test]
    fn test_geometry_table() {
        let cases = [
            ("a4", Some(A4_GEOMETRY)),
            ("legal", Some(LEGAL_GEOMETRY)),
            ("max", Some(MAX_GEOMETRY)),
            ("letter", None),
            ("b5", None),
        ];
        for (size, expected) in cases {
            let p = plan(&settings(&format!("('size' => '{}')", size)));
            assert_eq!(
                p.acquire().unwrap().geometry,
                expected.map(Geometry::from_table),
                "size {}",
                size
            );
        }
    }

    #[test]
    fn test_plan_is_pure() {
        let s = settings("('size' => 'legal', 'mode' => 'pdf', 'crop' => 1, 'deskew' => 1)");
        let first = plan(&s);
        for _ in 0..5 {
            assert_eq!(plan(&s), first);
        }
    }

    #[test]
    fn test_unknown_keys_do_not_affect_plan() {
        assert_eq!(
            plan(&settings("('mode' => 'jpg', 'tray' => 'rear')")),
            plan(&settings("('mode' => 'jpg')"))
        );
    }

    #[test]
    fn test_stage_display_is_flat() {
        let p = plan(&settings("('mode' => 'pdf')"));
        assert_eq!(
            p.stages()[2].to_string(),
            "Aggregate{output=output-directory}"
        );
        assert!(p.stages()[0].to_string().contains("geometry=default"));
        assert!(p.stages()[0].to_string().contains("resolution=200"));
    }
}
