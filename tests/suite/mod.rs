mod cli;
mod workers;
