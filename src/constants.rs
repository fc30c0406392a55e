//! Engine-wide constants: fuzzy-match thresholds, merge tolerances, the
//! sports feed endpoint, and the static upstream-to-service channel map.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Either metric at or above this score is a "safe" match.
pub const SAFE_FUZZY_MATCH_PERCENTAGE: i32 = 70;

/// Both metrics at or above this score is a "risky" match.
pub const RISKY_FUZZY_MATCH_PERCENTAGE: i32 = 50;

/// Two instants are aligned when they differ by at most this many seconds.
pub const MAXIMUM_TIME_DELTA_IN_SECONDS: i64 = 1800;

/// Candidate keys kept per broad-search query string.
pub const BROAD_SEARCH_LIMIT: usize = 5;

/// A (sports category, EPG category) pair witnessed more than this many
/// times during a run is promoted into the category_map table.
pub const CATEGORY_MAP_PROMOTION_THRESHOLD: u32 = 3;

pub const SPORTS_FEED_BASE_URL: &str = "https://fast-guide.smoothstreams.tv/";
pub const SPORTS_FEED_FILE_NAME: &str = "feed.xml";

pub const DEFAULT_OUTPUT_NUMBER_OF_DAYS: [u32; 3] = [1, 3, 7];

pub const DEFAULT_CONFIGURATION_FILE_PATH: &str = "epg-reconciler.toml";
pub const DEFAULT_DB_FILE_PATH: &str = "db/epg-reconciler.db";
pub const DEFAULT_DB_CREATE_SCHEMA_FILE_PATH: &str = "db/create_schema.sql";
pub const DEFAULT_CHANNEL_MAP_FILE_PATH: &str = "resources/channel_map.xml";
pub const DEFAULT_INPUT_XMLTV_DIRECTORY_PATH: &str = "xmltv";
pub const DEFAULT_LOG_FILE_PATH: &str = "logs/epg-reconciler.log";
pub const DEFAULT_OUTPUT_XMLTV_DIRECTORY_PATH: &str = "output";

/// Upstream lineup channel identifiers mapped to service channel numbers.
/// Upstream ids are matched against their canonical `I<major>.<minor>` form
/// (see [`crate::models::canonical_channel_id`]).
pub static CHANNEL_ID_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("I207.59976", "1"),
        ("I206.32645", "2"),
        ("I209.45507", "3"),
        ("I208.60696", "4"),
        ("I219.82547", "5"),
        ("I618.59305", "6"),
        ("I212.45399", "7"),
        ("I216.45526", "8"),
        ("I213.62081", "9"),
        ("I215.58690", "10"),
        ("I220.48639", "11"),
        ("I218.61854", "12"),
        ("I217.60316", "13"),
        ("I221.59250", "14"),
        ("I1423.48099", "15"),
        ("I1446.91306", "16"),
        ("I1420.68946", "17"),
        ("I1410.49952", "18"),
        ("I1405.62111", "19"),
        ("I1409.68859", "20"),
        ("I1401.34313", "21"),
        ("I464.77033", "22"),
        ("I466.71914", "23"),
        ("I249.62420", "24"),
        ("I241.59186", "25"),
        ("I242.58452", "26"),
        ("I265.51529", "27"),
        ("I247.58515", "28"),
        ("I245.42642", "29"),
        ("I244.58623", "30"),
        ("I296.60048", "31"),
        ("I229.49788", "32"),
        ("I202.58646", "33"),
        ("I2.1.31507", "34"),
        ("I7.1.24052", "35"),
        ("I29.1.42945", "36"),
        ("I280.57391", "37"),
        ("I360.60179", "38"),
        ("I269.57708", "41"),
        ("I278.56905", "42"),
        ("I276.49438", "43"),
        ("I248.58574", "44"),
        ("I259.66379", "45"),
        ("I355.58780", "46"),
        ("I254.59337", "47"),
        ("I501.19548", "48"),
        ("I506.59839", "49"),
        ("I231.50747", "50"),
        ("I509.59845", "51"),
        ("I545.21868", "52"),
        ("I519.59948", "53"),
        ("I517.59373", "54"),
        ("I531.67236", "55"),
        ("I525.34941", "56"),
        ("I535.36225", "57"),
        ("I285.65342", "58"),
        ("I515.34933", "59"),
        ("I520.59961", "60"),
        ("I4.1.24051", "63"),
        ("I1400.90123", "65"),
        ("I1204.34200", "66"),
        ("I1203.44792", "67"),
        ("I1201.44784", "68"),
        ("I1202.72705", "69"),
        ("I406.76382", "70"),
        ("I346.89690", "71"),
        ("I623.87000", "73"),
        ("I610.58321", "76"),
        ("I232.68065", "77"),
        ("I264.64492", "78"),
        ("I712.68605", "80"),
        ("I53.87010", "100"),
        ("I25.69046130", "101"),
        ("I26.69046131", "102"),
        ("I374.72791", "105"),
        ("I378.87629", "106"),
        ("I422.109501", "107"),
        ("I867.82450", "108"),
        ("I868.82451", "109"),
        ("I869.95772", "110"),
        ("I872.64572", "111"),
        ("I409.90643", "112"),
        ("I401.17744", "113"),
        ("I404.19036", "114"),
        ("I407.19038", "115"),
        ("I405.24216", "116"),
        ("I402.89362", "117"),
        ("I406.74410", "118"),
        ("I145.100264", "119"),
        ("I403.104325", "120"),
        ("I408.104322", "121"),
        ("I1412.91308", "123"),
        ("I1413.76955", "124"),
        ("I356.64241", "127"),
        ("I252.60150", "131"),
        ("I312.66268", "132"),
        ("I362.58812", "145"),
        ("I1503.94289", "150"),
    ])
});

/// Service channel number for a canonical upstream channel id, if mapped.
pub fn service_channel_for(canonical_id: &str) -> Option<&'static str> {
    CHANNEL_ID_MAP.get(canonical_id).copied()
}
