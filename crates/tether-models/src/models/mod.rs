//! Data models shared by the manager and its collaborators
pub mod agents;
pub mod any;
pub mod configurations;
pub mod labels;
pub mod resources;

pub use agents::{Agent, AgentStatus, AgentUpgrade, AgentVersion, UpgradeStatus};
pub use any::AnyResource;
pub use configurations::Configuration;
pub use labels::{AgentSelector, Labels};
pub use resources::{
    Destination, DestinationType, Parameter, ParameterDefinition, Processor, ProcessorType,
    Resource, ResourceConfiguration, ResourceKind, Source, SourceType, TypeSpec,
};
