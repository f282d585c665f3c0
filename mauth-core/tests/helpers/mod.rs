//! Deterministic movement trace generators for mauth-core integration tests
//!
//! Each synthetic user moves in a recognisable style:
//! - user 1: long straight horizontal strokes
//! - user 2: short zig-zag strokes
//! - user 3: circular arcs

#![allow(dead_code)]

use mauth_core::{MovementTrace, Point, StoredTrace, UserId};

/// Evenly spaced points along a line from the origin
pub fn straight_trace(len: usize, step: f64, angle: f64) -> MovementTrace {
    let (dx, dy) = (step * angle.cos(), step * angle.sin());
    points((0..len).map(|i| (i as f64 * dx, i as f64 * dy)))
}

/// Trace `variant` of the given synthetic user (1, 2 or 3)
pub fn user_trace(user: i64, variant: usize) -> MovementTrace {
    let v = variant as f64;
    match user {
        1 => straight_trace(12 + variant % 4, 10.0 + v * 0.3, 0.0),
        2 => points((0..10 + variant % 3).map(|i| {
            let y = if i % 2 == 0 { 0.0 } else { 15.0 + v * 0.5 };
            (i as f64 * (4.0 + v * 0.1), y)
        })),
        _ => {
            let radius = 50.0 + v * 2.0;
            points((0..14 + variant % 5).map(|i| {
                let theta = i as f64 * 0.25;
                (radius * theta.cos(), radius * theta.sin())
            }))
        }
    }
}

/// `per_user` training traces for each of users 1, 2 and 3
pub fn population(per_user: usize) -> Vec<StoredTrace> {
    (1..=3)
        .flat_map(|user| {
            (0..per_user).map(move |variant| StoredTrace {
                user_id: UserId(user),
                is_training_data: true,
                trace: user_trace(user, variant),
            })
        })
        .collect()
}

fn points(coords: impl Iterator<Item = (f64, f64)>) -> MovementTrace {
    MovementTrace::new(coords.map(|(x, y)| Point::new(x, y)).collect()).unwrap()
}
