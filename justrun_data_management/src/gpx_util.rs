use std::{fs::File, io::{BufReader, BufWriter, Read, Write}, path::Path};

use chrono::{DateTime, TimeDelta, Utc};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use justrun_lib::{jog::Jog, position::{Position, RawSample}};

use crate::{DataManager, DataManagerError};

/// Metres of accuracy radius per unit of horizontal dilution of precision.
pub const METERS_PER_HDOP: f64 = 5.0;
/// Accuracy assumed for points that carry no HDOP.
pub const DEFAULT_ACCURACY_M: f64 = 10.0;

impl DataManager {
    /// Writes a stored jog to `path` as a single-track GPX file.
    pub async fn export_jog_gpx(&self, jog_id: i64, path: &Path) -> Result<(), DataManagerError> {
        let jog = self.get_jog(jog_id).await?
            .ok_or_else(|| DataManagerError::Database(format!("No jog with id {}", jog_id)))?;

        let file = File::create(path)
            .map_err(|e| DataManagerError::Gpx(format!("Failed to create {:?}: {}", path, e)))?;
        write_jog_gpx(&jog, BufWriter::new(file))?;

        tracing::info!("Exported jog {} to {:?}", jog_id, path);
        Ok(())
    }
}

pub fn read_gpx_file(path: &Path) -> Result<Vec<RawSample>, DataManagerError> {
    let file = File::open(path)
        .map_err(|e| DataManagerError::Gpx(format!("Failed to open {:?}: {}", path, e)))?;
    read_gpx_samples(BufReader::new(file))
}

/// Every track point of every track, in file order. A point without a time
/// is placed one second after the previous point, or at the first known time
/// when no earlier point has one.
pub fn read_gpx_samples<R: Read>(reader: R) -> Result<Vec<RawSample>, DataManagerError> {
    let gpx = gpx::read(reader)
        .map_err(|e| DataManagerError::Gpx(format!("Failed to parse gpx: {}", e)))?;

    let mut points = Vec::new();
    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                points.push(to_untimed_sample(&point)?);
            }
        }
    }

    let first_known = points.iter().find_map(|(_, time)| *time).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut samples: Vec<RawSample> = Vec::with_capacity(points.len());
    for (mut sample, time) in points {
        sample.timestamp = match (time, samples.last()) {
            (Some(time), _) => time,
            (None, Some(previous)) => previous.timestamp + TimeDelta::seconds(1),
            (None, None) => first_known,
        };
        samples.push(sample);
    }

    Ok(samples)
}

fn to_untimed_sample(point: &Waypoint) -> Result<(RawSample, Option<DateTime<Utc>>), DataManagerError> {
    let coordinates = point.point();
    let accuracy_m = point.hdop.map(|hdop| hdop * METERS_PER_HDOP).unwrap_or(DEFAULT_ACCURACY_M);

    let time = match &point.time {
        Some(time) => {
            let formatted = time.format()
                .map_err(|e| DataManagerError::Gpx(format!("Failed to format point time: {:?}", e)))?;
            let parsed = DateTime::parse_from_rfc3339(&formatted)
                .map_err(|e| DataManagerError::Gpx(format!("Invalid point time {}: {}", formatted, e)))?;
            Some(parsed.with_timezone(&Utc))
        }
        None => None,
    };

    let sample = RawSample::new(
        Position::new(coordinates.y(), coordinates.x()),
        accuracy_m,
        DateTime::<Utc>::UNIX_EPOCH,
    );
    Ok((sample, time))
}

pub fn write_jog_gpx<W: Write>(jog: &Jog, writer: W) -> Result<(), DataManagerError> {
    let mut segment = TrackSegment::new();
    segment.points = jog.route.iter()
        .map(|position| Waypoint::new((*position).into()))
        .collect();

    let mut track = Track::new();
    track.name = Some(format!("Jog {} ({})", jog.jog_id, jog.created_at.format("%Y-%m-%d %H:%M")));
    track.segments.push(segment);

    let gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("justrun".to_string()),
        tracks: vec![track],
        ..Default::default()
    };

    gpx::write(&gpx, writer)
        .map_err(|e| DataManagerError::Gpx(format!("Failed to write gpx: {}", e)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const RECORDED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="watch" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning run</name>
    <trkseg>
      <trkpt lat="40.0" lon="-74.0">
        <time>2024-05-10T07:00:00Z</time>
        <hdop>3.0</hdop>
      </trkpt>
      <trkpt lat="40.0004" lon="-74.0">
        <time>2024-05-10T07:00:03Z</time>
      </trkpt>
      <trkpt lat="40.0008" lon="-74.0"/>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn reads_samples_with_accuracy_and_time() {
        let samples = read_gpx_samples(RECORDED.as_bytes()).unwrap();
        assert_eq!(samples.len(), 3);

        assert_eq!(samples[0].position, Position::new(40.0, -74.0));
        assert_eq!(samples[0].accuracy_m, 15.0);
        assert_eq!(samples[0].timestamp, Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap());

        assert_eq!(samples[1].accuracy_m, DEFAULT_ACCURACY_M);
        assert_eq!(samples[2].timestamp, Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 4).unwrap());
    }

    #[test]
    fn leading_untimed_points_take_first_known_time() {
        let raw = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="watch" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <trkseg>
      <trkpt lat="40.0" lon="-74.0"/>
      <trkpt lat="40.0004" lon="-74.0">
        <time>2024-05-10T07:00:03Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let samples = read_gpx_samples(raw.as_bytes()).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 3).unwrap();
        assert_eq!(samples[0].timestamp, expected);
        assert_eq!(samples[1].timestamp, expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(read_gpx_samples("not xml".as_bytes()), Err(DataManagerError::Gpx(_))));
    }

    #[test]
    fn written_jog_reads_back_as_route() {
        let jog = Jog {
            jog_id: 7,
            user_id: "runner".to_string(),
            route: vec![Position::new(55.5, 12.25), Position::new(55.5004, 12.25)],
            distance_km: 0.0445,
            duration_seconds: 20,
            steps: 58,
            created_at: Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap(),
        };

        let mut buffer = Vec::new();
        write_jog_gpx(&jog, &mut buffer).unwrap();

        let samples = read_gpx_samples(buffer.as_slice()).unwrap();
        let route: Vec<Position> = samples.iter().map(|sample| sample.position).collect();
        assert_eq!(route, jog.route);
    }
}
