mod fixtures;

mod connections;
mod execute;
mod fragments;
mod optimistic;
mod persistence;
mod reentrancy;
mod subscriptions;
