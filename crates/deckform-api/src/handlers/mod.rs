pub mod assemblies;
pub mod events;
pub mod tasks;
pub mod uploads;
