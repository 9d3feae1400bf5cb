use crate::envelope::{Envelope, envelope_of};
use crate::error::Result;
use crate::geom::Geometry;
use crate::gpkg::decode_gpkg_geometry;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Register all spatial SQL helper functions in the provided connection.
///
/// Each function takes a GeoPackage geometry blob and returns NULL for a NULL
/// or empty geometry.
///
/// Example:
/// ```no_run
/// use rusqlite::Connection;
/// use rusqlite_gpkg_index::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinX", |e| Some(e.min_x))?;
    register_bounds_component(conn, "ST_MaxX", |e| Some(e.max_x))?;
    register_bounds_component(conn, "ST_MinY", |e| Some(e.min_y))?;
    register_bounds_component(conn, "ST_MaxY", |e| Some(e.max_y))?;
    register_bounds_component(conn, "ST_MinZ", |e| e.z.map(|z| z.min))?;
    register_bounds_component(conn, "ST_MaxZ", |e| e.z.map(|z| z.max))?;
    register_bounds_component(conn, "ST_MinM", |e| e.m.map(|m| m.min))?;
    register_bounds_component(conn, "ST_MaxM", |e| e.m.map(|m| m.max))?;
    register_st_isempty(conn)?;
    Ok(())
}

fn register_st_isempty(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let envelope = match envelope_from_ctx(ctx)? {
                Some(envelope) => envelope,
                None => return Ok(None),
            };
            Ok(Some(i64::from(envelope.is_none())))
        },
    )?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(&Envelope) -> Option<f64> + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        Ok(envelope_from_ctx(ctx)?.flatten().as_ref().and_then(f))
    })?;
    Ok(())
}

/// `None` for SQL NULL, `Some(None)` for an empty geometry.
fn envelope_from_ctx(ctx: &Context<'_>) -> std::result::Result<Option<Option<Envelope>>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            let envelope =
                blob_envelope(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
            Ok(Some(envelope))
        }
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

fn blob_envelope(blob: &[u8]) -> Result<Option<Envelope>> {
    let header = decode_gpkg_geometry(blob)?;
    if header.empty {
        return Ok(None);
    }
    let geometry = Geometry::parse_wkb(header.wkb)?;
    let envelope = envelope_of(&geometry);
    Ok((!envelope.is_empty()).then_some(envelope))
}

#[cfg(test)]
mod tests {
    use super::register_spatial_functions;
    use crate::Result;
    use crate::geom::Geometry;
    use crate::gpkg::encode_gpkg_geometry;
    use rusqlite::{Connection, params};

    fn connection() -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;
        Ok(conn)
    }

    fn blob(wkt: &str) -> Result<Vec<u8>> {
        Ok(encode_gpkg_geometry(&Geometry::parse_wkt(wkt)?, 4326))
    }

    fn xy_bounds(conn: &Connection, blob: &[u8]) -> Result<(f64, f64, f64, f64)> {
        Ok(conn.query_row(
            "SELECT ST_MinX(?1), ST_MaxX(?1), ST_MinY(?1), ST_MaxY(?1)",
            params![blob],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
    }

    #[test]
    fn st_bounds_for_point() -> Result<()> {
        let conn = connection()?;
        let blob = blob("POINT(1.5 -2)")?;
        assert_eq!(xy_bounds(&conn, &blob)?, (1.5, 1.5, -2.0, -2.0));

        let empty: i64 = conn.query_row("SELECT ST_IsEmpty(?1)", params![blob], |row| row.get(0))?;
        assert_eq!(empty, 0);
        Ok(())
    }

    #[test]
    fn st_is_empty_for_empty_linestring() -> Result<()> {
        let conn = connection()?;
        let blob = blob("LINESTRING EMPTY")?;

        let (minx, empty): (Option<f64>, i64) =
            conn.query_row("SELECT ST_MinX(?1), ST_IsEmpty(?1)", params![blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        assert!(minx.is_none());
        assert_eq!(empty, 1);
        Ok(())
    }

    #[test]
    fn st_bounds_for_multis_and_collections() -> Result<()> {
        let conn = connection()?;
        assert_eq!(
            xy_bounds(&conn, &blob("MULTIPOINT(1 5,-2 3)")?)?,
            (-2.0, 1.0, 3.0, 5.0)
        );
        assert_eq!(
            xy_bounds(&conn, &blob("MULTILINESTRING((0 0,2 1),(-3 4,-1 2))")?)?,
            (-3.0, 2.0, 0.0, 4.0)
        );
        assert_eq!(
            xy_bounds(
                &conn,
                &blob("GEOMETRYCOLLECTION(POINT(5 -1),LINESTRING(-2 2,1 3))")?
            )?,
            (-2.0, 5.0, -1.0, 3.0)
        );
        Ok(())
    }

    #[test]
    fn st_z_and_m_bounds() -> Result<()> {
        let conn = connection()?;
        let zm = blob("LINESTRING ZM (0 0 1 10,1 1 -4 30)")?;
        let (min_z, max_z, min_m, max_m): (f64, f64, f64, f64) = conn.query_row(
            "SELECT ST_MinZ(?1), ST_MaxZ(?1), ST_MinM(?1), ST_MaxM(?1)",
            params![zm],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        assert_eq!((min_z, max_z, min_m, max_m), (-4.0, 1.0, 10.0, 30.0));

        let xy = blob("POINT(1 2)")?;
        let (min_z, max_m): (Option<f64>, Option<f64>) = conn.query_row(
            "SELECT ST_MinZ(?1), ST_MaxM(?1)",
            params![xy],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!((min_z, max_m), (None, None));
        Ok(())
    }

    #[test]
    fn null_input_and_bad_input() -> Result<()> {
        let conn = connection()?;
        let (minx, empty): (Option<f64>, Option<i64>) = conn.query_row(
            "SELECT ST_MinX(NULL), ST_IsEmpty(NULL)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!((minx, empty), (None, None));

        assert!(
            conn.query_row("SELECT ST_MinX('text')", [], |row| row.get::<_, Option<f64>>(0))
                .is_err()
        );
        assert!(
            conn.query_row("SELECT ST_MinX(X'00')", [], |row| row.get::<_, Option<f64>>(0))
                .is_err()
        );
        Ok(())
    }
}
