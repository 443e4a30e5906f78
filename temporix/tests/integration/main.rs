// Integration tests follow the organization suggested by Matklad:
// https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

#[cfg(not(miri))]
mod simulation_clock_sync;
mod simulation_control;
mod simulation_protocol;
mod simulation_scheduling;
