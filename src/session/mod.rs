//! A counting session: one annotation set bound to one working image.
//!
//! Everything a user can do is a [`Command`] passed to [`Session::apply`].
//! Commands either succeed with an [`Outcome`] or fail without changing the
//! session.
//!
//! # States
//!
//! ```text
//! Uninitialized --Initialize--> Ready { delete_mode: false }
//! Ready { d }   --ToggleDeleteMode--> Ready { !d }
//! Ready { _ }   --Reset--> Uninitialized
//! Ready { _ }   --Initialize--> Ready { delete_mode: false }
//! ```
//!
//! # Example
//!
//! ```
//! use cellcount::config::CounterOptions;
//! use cellcount::model::TypeIndex;
//! use cellcount::pixels::ImageStack;
//! use cellcount::session::{Command, PointerEvent, Session};
//!
//! let image = ImageStack::new("sample.tif", 64, 64, vec![vec![0.0; 64 * 64]]).unwrap();
//! let mut session = Session::new(CounterOptions::default()).unwrap();
//! session.apply(Command::Initialize(image)).unwrap();
//! session.apply(Command::SelectType(TypeIndex(0))).unwrap();
//! session.click(PointerEvent::new(10.0, 12.0, 1)).unwrap();
//! assert_eq!(session.annotations().markers().total_markers(), 1);
//! ```

pub mod interaction;

use std::path::PathBuf;

pub use interaction::{Action, ActionOutcome, ModeFlags, PointerEvent};

use crate::config::CounterOptions;
use crate::error::CellCountError;
use crate::measure::{measure_markers, MeasureOptions, MeasureReport};
use crate::model::io_marker_xml::{with_xml_extension, write_marker_xml};
use crate::model::{
    AnnotationSet, CounterType, Marker, MarkerFile, MarkerFormat, Polygon, TypeIndex,
};
use crate::pixels::PixelSource;
use crate::report::{count_markers, CountReport, ReportOptions};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No working image yet; only counter types can be edited.
    #[default]
    Uninitialized,
    Ready {
        delete_mode: bool,
    },
}

/// Display-only flags. Tracked for the rendering layer; they never affect
/// counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayFlags {
    pub show_numbers: bool,
    pub show_all: bool,
}

/// A user action.
#[derive(Debug)]
pub enum Command<S> {
    /// Binds the session to a working image.
    Initialize(S),
    /// Adds a counter type; `None` uses the default "Type N" name.
    AddType(Option<String>),
    RemoveLastType,
    RenameType(TypeIndex, String),
    SelectType(TypeIndex),
    ToggleDeleteMode,
    ToggleShowNumbers,
    ToggleShowAll,
    /// Pops the most recent marker of the selected type.
    DeleteLastMarker,
    AddSubregion(Polygon),
    RemoveLastSubregion,
    Reset,
    Click(PointerEvent),
    Report(ReportOptions),
    /// Saves the markers as XML; `.xml` is appended when missing.
    Export(PathBuf),
    /// Loads markers from XML or JSON (by extension). A file made on another
    /// image is refused unless `force` is set.
    Import { path: PathBuf, force: bool },
    Measure(MeasureOptions),
}

/// The result of a successful command.
#[derive(Debug)]
pub enum Outcome {
    Done,
    TypeAdded(TypeIndex),
    TypeRemoved(CounterType),
    DeleteMode(bool),
    ShowNumbers(bool),
    ShowAll(bool),
    MarkerRemoved(Option<Marker>),
    SubregionAdded(usize),
    SubregionRemoved(Option<Polygon>),
    Clicked(ActionOutcome),
    Report(CountReport),
    Exported(PathBuf),
    Imported {
        markers: usize,
        /// Title recorded in the file, when it differed from the image.
        mismatched_identity: Option<String>,
    },
    Measured(MeasureReport),
}

/// A counting session over images of type `S`.
#[derive(Debug)]
pub struct Session<S> {
    options: CounterOptions,
    annotations: AnnotationSet,
    state: SessionState,
    display: DisplayFlags,
    image: Option<S>,
}

impl<S: PixelSource> Session<S> {
    /// Creates an uninitialized session with the configured default types.
    pub fn new(options: CounterOptions) -> Result<Self, CellCountError> {
        options.validate()?;
        let annotations = AnnotationSet::with_default_types(options.initial_types, options.max_types)?;
        let display = DisplayFlags {
            show_numbers: options.show_numbers,
            show_all: options.show_all,
        };
        Ok(Self {
            options,
            annotations,
            state: SessionState::Uninitialized,
            display,
            image: None,
        })
    }

    pub fn options(&self) -> &CounterOptions {
        &self.options
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn display(&self) -> DisplayFlags {
        self.display
    }

    pub fn image(&self) -> Option<&S> {
        self.image.as_ref()
    }

    /// Whether the caller counts on a copy and keeps the original image.
    pub fn keep_original(&self) -> bool {
        self.options.keep_original
    }

    pub fn mode(&self) -> ModeFlags {
        match self.state {
            SessionState::Ready { delete_mode } => ModeFlags { delete_mode },
            SessionState::Uninitialized => ModeFlags::default(),
        }
    }

    /// Report options with the configured subregion default.
    pub fn default_report_options(&self) -> ReportOptions {
        ReportOptions {
            restrict_to_subregions: self.options.restrict_to_subregions,
        }
    }

    /// Executes one command.
    pub fn apply(&mut self, command: Command<S>) -> Result<Outcome, CellCountError> {
        match command {
            Command::Initialize(image) => {
                self.initialize(image);
                Ok(Outcome::Done)
            }
            Command::AddType(name) => {
                let index = match name {
                    Some(name) => self.annotations.add_type(name)?,
                    None => self.annotations.add_default_type()?,
                };
                Ok(Outcome::TypeAdded(index))
            }
            Command::RemoveLastType => Ok(Outcome::TypeRemoved(self.annotations.remove_last_type()?)),
            Command::RenameType(index, name) => {
                self.annotations.rename_type(index, name)?;
                Ok(Outcome::Done)
            }
            Command::SelectType(index) => {
                self.require_ready("select a counter type")?;
                self.annotations.select_type(index)?;
                Ok(Outcome::Done)
            }
            Command::ToggleDeleteMode => {
                let delete_mode = !self.require_ready("toggle delete mode")?.delete_mode;
                self.state = SessionState::Ready { delete_mode };
                Ok(Outcome::DeleteMode(delete_mode))
            }
            Command::ToggleShowNumbers => {
                self.display.show_numbers = !self.display.show_numbers;
                Ok(Outcome::ShowNumbers(self.display.show_numbers))
            }
            Command::ToggleShowAll => {
                let image = self.require_image("show markers on all slices")?;
                let enable = !self.display.show_all;
                if enable && !image.dimensions().is_stack() {
                    return Err(CellCountError::InvalidState(
                        "showing markers on all slices needs a stack".to_string(),
                    ));
                }
                self.display.show_all = enable;
                Ok(Outcome::ShowAll(enable))
            }
            Command::DeleteLastMarker => {
                self.require_ready("delete a marker")?;
                let index = self.selected_type()?;
                Ok(Outcome::MarkerRemoved(self.annotations.remove_last_marker(index)?))
            }
            Command::AddSubregion(polygon) => {
                self.require_ready("add a subregion")?;
                Ok(Outcome::SubregionAdded(self.annotations.add_subregion(polygon)?))
            }
            Command::RemoveLastSubregion => {
                Ok(Outcome::SubregionRemoved(self.annotations.remove_last_subregion()))
            }
            Command::Reset => {
                self.reset();
                Ok(Outcome::Done)
            }
            Command::Click(event) => self.click(event).map(Outcome::Clicked),
            Command::Report(opts) => self.report(&opts).map(Outcome::Report),
            Command::Export(path) => self.export(path).map(Outcome::Exported),
            Command::Import { path, force } => self.import(path, force),
            Command::Measure(opts) => {
                let image = self.require_image("measure")?;
                Ok(Outcome::Measured(measure_markers(&self.annotations, image, &opts)?))
            }
        }
    }

    /// Resolves and applies a click on the working image.
    pub fn click(&mut self, event: PointerEvent) -> Result<ActionOutcome, CellCountError> {
        let stack_size = self.require_image("place markers")?.dimensions().stack_size();
        if event.slice == 0 || event.slice > stack_size {
            return Err(CellCountError::InvalidInput(format!(
                "slice {} is outside the stack (1..={stack_size})",
                event.slice
            )));
        }
        let action = interaction::resolve(
            &event,
            self.mode(),
            self.annotations.current_type(),
            self.options.delete_tolerance,
        )?;
        interaction::apply(&mut self.annotations, &action)
    }

    /// Counts markers per slice and in total.
    pub fn report(&self, opts: &ReportOptions) -> Result<CountReport, CellCountError> {
        let image = self.require_image("report counts")?;
        count_markers(&self.annotations, &image.dimensions(), opts)
    }

    fn initialize(&mut self, image: S) {
        let dims = image.dimensions();
        log::info!(
            "initializing on '{}' ({}x{}, {} plane(s))",
            image.title(),
            dims.width,
            dims.height,
            dims.stack_size()
        );
        self.annotations.clear_annotations();
        self.annotations.clear_selection();
        self.display = DisplayFlags {
            show_numbers: self.options.show_numbers,
            show_all: self.options.show_all && dims.is_stack(),
        };
        self.image = Some(image);
        self.state = SessionState::Ready { delete_mode: false };
    }

    fn reset(&mut self) {
        log::info!(
            "resetting session, dropping {} marker(s)",
            self.annotations.markers().total_markers()
        );
        self.annotations.clear_annotations();
        self.annotations.clear_selection();
        self.image = None;
        self.state = SessionState::Uninitialized;
    }

    fn export(&self, path: PathBuf) -> Result<PathBuf, CellCountError> {
        let image = self.require_image("export markers")?;
        let path = with_xml_extension(&path);
        let file = MarkerFile::new(image.title(), self.annotations.clone())
            .with_calibration(image.calibration());
        write_marker_xml(&path, &file)?;
        log::info!(
            "exported {} marker(s) to {}",
            self.annotations.markers().total_markers(),
            path.display()
        );
        Ok(path)
    }

    fn import(&mut self, path: PathBuf, force: bool) -> Result<Outcome, CellCountError> {
        let image = self.require_image("import markers")?;
        let format = MarkerFormat::from_path(&path).unwrap_or(MarkerFormat::Xml);
        let file = format.read(&path)?;

        let mismatched_identity = match file.check_identity(image.title()) {
            Ok(()) => None,
            Err(err) if force => {
                log::warn!("{err}; importing anyway");
                Some(file.source_identity.clone())
            }
            Err(err) => {
                log::warn!("{err}");
                return Err(err);
            }
        };

        let mut annotations = file.annotations;
        annotations.set_max_types(self.options.max_types)?;

        let markers = annotations.markers().total_markers();
        self.annotations = annotations;
        log::info!("imported {} marker(s) from {}", markers, path.display());
        Ok(Outcome::Imported {
            markers,
            mismatched_identity,
        })
    }

    fn require_ready(&self, what: &str) -> Result<ModeFlags, CellCountError> {
        match self.state {
            SessionState::Ready { delete_mode } => Ok(ModeFlags { delete_mode }),
            SessionState::Uninitialized => Err(CellCountError::InvalidState(format!(
                "cannot {what} before the counter is initialized"
            ))),
        }
    }

    fn require_image(&self, what: &str) -> Result<&S, CellCountError> {
        self.require_ready(what)?;
        self.image.as_ref().ok_or_else(|| {
            CellCountError::InvalidState(format!("cannot {what} without a working image"))
        })
    }

    fn selected_type(&self) -> Result<TypeIndex, CellCountError> {
        self.annotations
            .current_type()
            .ok_or_else(|| CellCountError::InvalidState("no counter type selected".to_string()))
    }
}
