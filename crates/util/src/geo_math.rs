use std::f64::consts::PI;
use types::{Coordinate, TileKey};

fn tiles_per_axis(zoom: u8) -> f64 {
    2.0_f64.powi(zoom as i32)
}

fn clamp_to_grid(value: f64, zoom: u8) -> u32 {
    let max = (1u64 << zoom) - 1;
    (value.floor().max(0.0) as u64).min(max) as u32
}

/// Fractional tile column of a longitude at `zoom`.
pub fn column_from_longitude_f(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * tiles_per_axis(zoom)
}

/// Fractional tile row of a latitude at `zoom`, counted from the north edge.
pub fn row_from_latitude_f(lat: f64, zoom: u8) -> f64 {
    let lat_rad = lat * PI / 180.0;
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * tiles_per_axis(zoom)
}

pub fn column_from_longitude(lon: f64, zoom: u8) -> u32 {
    clamp_to_grid(column_from_longitude_f(lon, zoom), zoom)
}

pub fn row_from_latitude(lat: f64, zoom: u8) -> u32 {
    clamp_to_grid(row_from_latitude_f(lat, zoom), zoom)
}

pub fn tile_for(coordinate: &Coordinate, zoom: u8) -> TileKey {
    TileKey::new(
        zoom,
        row_from_latitude(coordinate.latitude, zoom),
        column_from_longitude(coordinate.longitude, zoom),
    )
}

/// Converts between north-origin rows and the south-origin rows stored in MBTiles.
pub fn flip_row(zoom: u8, row: u32) -> u32 {
    ((1u64 << zoom) - row as u64 - 1) as u32
}
