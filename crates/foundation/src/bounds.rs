/// Geographic position in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        LngLat { lng, lat }
    }
}

/// Visible extent of the camera as `[west, south, east, north]` degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LngLatBounds {
    pub south_west: LngLat,
    pub north_east: LngLat,
}

impl LngLatBounds {
    pub fn new(south_west: LngLat, north_east: LngLat) -> Self {
        LngLatBounds {
            south_west,
            north_east,
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [
            self.south_west.lng,
            self.south_west.lat,
            self.north_east.lng,
            self.north_east.lat,
        ]
    }
}
