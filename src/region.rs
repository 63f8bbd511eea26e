//! Region filter loaded from GeoJSON.
//!
//! A region is a polygon or multipolygon given as a GeoJSON
//! `FeatureCollection`, `Feature` or bare geometry; polygons nested in a
//! `GeometryCollection` are collected too. Only the first feature of a
//! collection is used. Coordinates follow GeoJSON order
//! (`[longitude, latitude]`).

use std::path::Path;

use geo::{Contains, Geometry, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use log::{debug, info};

use crate::error::{CellMatchError, OptionExt, Result};
use crate::records::{NormalizedBatch, Record};
use crate::GpsPoint;

/// Area used to separate records inside and outside a zone of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    shape: MultiPolygon<f64>,
}

impl Region {
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Self {
            shape: MultiPolygon::new(polygons),
        }
    }

    /// Parse a GeoJSON document.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let doc: GeoJson = text.parse().map_err(geojson_error)?;
        let geometry = Geometry::<f64>::try_from(first_geometry(doc)?).map_err(geojson_error)?;
        let region = Self::from_polygons(polygons_of(geometry)?);
        debug!("[Region] Parsed {} polygons", region.shape.0.len());
        Ok(region)
    }

    /// Read and parse a GeoJSON file.
    pub fn from_geojson_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CellMatchError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_geojson_str(&text)
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.shape.0
    }

    /// True if the point lies strictly inside the region.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        self.shape
            .contains(&Point::new(point.longitude, point.latitude))
    }

    /// Records of the batch that fall outside the region, in batch order.
    pub fn records_outside<'a>(&self, batch: &'a NormalizedBatch) -> Vec<&'a Record> {
        let outside: Vec<&Record> = batch
            .records()
            .filter(|r| !self.contains(&r.point))
            .collect();
        info!(
            "[Region] {} of {} records outside region",
            outside.len(),
            batch.record_count()
        );
        outside
    }
}

/// Geometry of the document, or of its first feature.
fn first_geometry(doc: GeoJson) -> Result<geojson::Geometry> {
    match doc {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .next()
            .ok_or_geojson("FeatureCollection has no features")?
            .geometry
            .ok_or_geojson("Feature has no geometry"),
        GeoJson::Feature(feature) => feature.geometry.ok_or_geojson("Feature has no geometry"),
        GeoJson::Geometry(geometry) => Ok(geometry),
    }
}

/// Areal members of a geometry. Non-areal members of a collection are
/// ignored; a bare non-areal geometry is rejected.
fn polygons_of(geometry: Geometry<f64>) -> Result<Vec<Polygon<f64>>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![polygon]),
        Geometry::MultiPolygon(multi) => Ok(multi.0),
        Geometry::Rect(rect) => Ok(vec![rect.to_polygon()]),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for member in collection {
                if let Ok(mut found) = polygons_of(member) {
                    polygons.append(&mut found);
                }
            }
            if polygons.is_empty() {
                return Err(geojson_error("GeometryCollection holds no polygons"));
            }
            Ok(polygons)
        }
        _ => Err(geojson_error("region geometry must be a Polygon or MultiPolygon")),
    }
}

fn geojson_error(message: impl ToString) -> CellMatchError {
    CellMatchError::GeoJsonError {
        message: message.to_string(),
    }
}
