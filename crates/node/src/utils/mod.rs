pub mod console;
pub mod swarm_manager;
