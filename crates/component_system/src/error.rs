//! Error types for the component system

use crate::component::ComponentName;

/// Main error type for registry and dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The component has no live manager reference
    #[error("No component manager bound for {0}")]
    NotBound(ComponentName),

    /// The component already belongs to a live manager
    #[error("{component} component is already bound to {manager}")]
    AlreadyBound {
        component: ComponentName,
        manager: ComponentName,
    },

    /// A component with this name is already registered
    #[error("Component named {0:?} already exists")]
    DuplicateComponent(ComponentName),

    /// No component with this name is registered
    #[error("Component named {0:?} is not registered")]
    UnknownComponent(ComponentName),

    /// A scheduled handler returned an error
    #[error("Handler owned by {owner:?} failed on {event:?}: {source}")]
    HandlerFailed {
        event: String,
        owner: ComponentName,
        #[source]
        source: anyhow::Error,
    },

    /// A scheduled handler panicked
    #[error("Handler owned by {owner:?} panicked on {event:?}: {message}")]
    HandlerPanicked {
        event: String,
        owner: ComponentName,
        message: String,
    },

    /// A checkpoint observed that the surrounding scope was cancelled
    #[error("Scope was cancelled")]
    Cancelled,

    /// Several tasks in one scope failed concurrently
    #[error(
        "{} concurrent failures, first: {}",
        .0.len(),
        .0.first().map(ToString::to_string).unwrap_or_default()
    )]
    Multiple(Vec<ComponentError>),

    /// Failure surfaced while raising an event, with the event attached
    #[error("{source} (while raising {event})")]
    Raised {
        event: String,
        #[source]
        source: Box<ComponentError>,
    },
}

/// The kind of a [`ComponentError`], independent of attached context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotBound,
    AlreadyBound,
    DuplicateComponent,
    UnknownComponent,
    HandlerFailed,
    HandlerPanicked,
    Cancelled,
    Multiple,
}

impl ComponentError {
    /// Returns the kind of this error, looking through event context.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ComponentError::NotBound(_) => ErrorKind::NotBound,
            ComponentError::AlreadyBound { .. } => ErrorKind::AlreadyBound,
            ComponentError::DuplicateComponent(_) => ErrorKind::DuplicateComponent,
            ComponentError::UnknownComponent(_) => ErrorKind::UnknownComponent,
            ComponentError::HandlerFailed { .. } => ErrorKind::HandlerFailed,
            ComponentError::HandlerPanicked { .. } => ErrorKind::HandlerPanicked,
            ComponentError::Cancelled => ErrorKind::Cancelled,
            ComponentError::Multiple(_) => ErrorKind::Multiple,
            // root() never yields Raised
            ComponentError::Raised { source, .. } => source.kind(),
        }
    }

    /// Strips any event context and returns the underlying failure.
    pub fn root(&self) -> &ComponentError {
        let mut current = self;
        while let ComponentError::Raised { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the debug rendering of the event attached to this error, if any.
    pub fn event(&self) -> Option<&str> {
        match self {
            ComponentError::Raised { event, .. } => Some(event),
            _ => None,
        }
    }

    /// Attaches an event as diagnostic context.
    ///
    /// Errors that already carry context are returned unchanged, so an event
    /// bubbling through several managers is only recorded once.
    pub fn with_event(self, event: impl std::fmt::Debug) -> Self {
        match self {
            raised @ ComponentError::Raised { .. } => raised,
            other => ComponentError::Raised {
                event: format!("{event:?}"),
                source: Box::new(other),
            },
        }
    }

    /// Folds a list of task failures into one error.
    pub(crate) fn aggregate(mut errors: Vec<ComponentError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ComponentError::Multiple(errors)),
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML for the expected schema
    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The default configuration could not be rendered as TOML
    #[error("Configuration serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The logging subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
