//! Annual climate normals for a few Quebec locations, today and under RCP 8.5.

use biosim::{BioSimClient, BioSimError, ClientConfig, GeoLocation, Period, Rcp};

#[tokio::main]
async fn main() -> Result<(), BioSimError> {
    let client = BioSimClient::connect(ClientConfig::default()).await?;
    let locations = [
        GeoLocation::new(46.87, -71.25, 114.0),
        GeoLocation::new(45.50, -73.57, 36.0),
        GeoLocation::without_elevation(48.45, -68.52),
    ];

    for (period, rcp) in [
        (Period::FromNormals1991To2020, None),
        (Period::FromNormals2051To2080, Some(Rcp::Rcp85)),
    ] {
        let normals = client
            .annual_normals()
            .period(period)
            .locations(&locations)
            .maybe_rcp(rcp)
            .call()
            .await?;

        println!("--- {period:?} ---");
        for (location, data_set) in &normals {
            let row: Vec<String> = data_set
                .field_names()
                .iter()
                .zip(data_set.observations()[0].values())
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{location}: {}", row.join(", "));
        }
        println!("took {:?}", client.last_request_duration());
    }

    client.shutdown().await
}
