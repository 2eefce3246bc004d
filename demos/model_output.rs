//! Runs two models on the same generated weather, then frees it on the server.

use biosim::{BioSimClient, BioSimError, ClientConfig, DataSet, GeoLocation};

#[tokio::main]
async fn main() -> Result<(), BioSimError> {
    let client = BioSimClient::connect(ClientConfig::default()).await?;
    println!("Available models: {:?}", client.model_list().await?);

    let locations = [
        GeoLocation::new(46.87, -71.25, 114.0),
        GeoLocation::new(45.50, -73.57, 36.0),
    ];
    for model in ["DegreeDay_Annual", "Spruce_Budworm_Biology"] {
        let output = client
            .model_output()
            .from_year(2015)
            .to_year(2020)
            .locations(&locations)
            .model(model)
            .call()
            .await?;
        let flat = DataSet::from_location_map(&output)?;
        println!(
            "{model}: {} rows, fields {:?}",
            flat.nb_observations(),
            flat.field_names()
        );
    }
    // The second model reused the weather generated for the first one.
    println!(
        "cache: {} lookups, {} hits",
        client.cache().lookups(),
        client.cache().hits()
    );

    client.shutdown().await
}
