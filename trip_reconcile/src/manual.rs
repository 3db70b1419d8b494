/*!

This is the long-form manual for `trip_reconcile` and `tripreco`.

## Input sources

A run reads up to four spreadsheets:
* `trips` the primary dispatch sheet (mandatory)
* `reference` the monthly reference workbook (mandatory)
* `summary` the release summary (optional)
* `exitMarks` the per-exit dispatch log (optional)

The optional sources may be missing or unreadable: the run then continues without
the enrichment they provide, and says so in the log. The mandatory files must
exist, but an unreadable one is handled the same way. Without trips there is
nothing to reconcile and the run fails.

### `trips`

One row per route, branch, vehicle type and day. Columns are found by name,
first by a case-insensitive exact match on one of their aliases, then by
substring.

| Column                    | Aliases                                         | Required |
|---------------------------|-------------------------------------------------|----------|
| Date                      | `Date`, `Дата`                                  | yes      |
| Route                     | `Route`, `Маршрут`                              | yes      |
| Branch                    | `Branch`, `Филиал`, `ТП`                        | yes      |
| VehicleType               | `VehicleType`, `Вид ТС`, `ТипТС`, `Авт/Эл`      | yes      |
| SpecialRouteFlag          | `SpecialRouteFlag`, `КТР`                       | yes      |
| PlannedDepartures         | `PlannedDepartures`, `Выпуск`, `ПланВыпуск`     | yes      |
| ActualDepartures          | `ActualDepartures`, `ФактВыпуск`                | yes      |
| PlannedTrips              | `PlannedTrips`, `Количество рейсов произ.`      | yes      |
| ActualTrips               | `ActualTrips`, `ФактРейсы`                      | yes      |
| LostTrips                 | `LostTrips`, `Потери`                           | yes      |
| Key2, Key4, Key5          | `Key2`, `Ключ 2`, ...                           | yes      |
| Site                      | `Site`, `Площадка`, `Территория`                | no       |
| DriverCount               | `DriverCount`, `Кол-во водителей`               | no       |
| RouteLengthKm             | `RouteLengthKm`, `Длина маршр., км`             | no       |
| Manual overrides          | `Ручной выпуск план`, `Ручной выпуск факт`, ... | no       |

The keys are always rebuilt from the other columns. The keys written in the sheet
are only compared with the rebuilt ones, and the differences are counted.

A blank planned departures or planned trips cell is a gap that the reference
workbook may fill. A cell that cannot be read as a number counts as zero and is
not a gap.

### `reference`

The monthly reference workbook has no usable header: its columns are addressed
by position, with Excel letters or 1-based numbers. The defaults are:

| Value        | Column |
|--------------|--------|
| label        | `A`    |
| route        | `B`    |
| route length | `F`    |
| departures   | `G`    |
| trips        | `R`    |
| drivers      | `W`    |

The label holds the date, the branch and the transport, for example
`01.07.2024 ЮЗ (авт)`. A trip is matched against the reference with three keys
of decreasing precision: date, route, branch and transport first, then date and
route, then the route alone. The route alone may match another day or another
branch.

### `summary`

The release summary gives, for each Key4, the authoritative planned and actual
departures and trips. It also gives the vehicle type of each Key2: when all the
rows of a Key2 agree on it, this type replaces the one of the trip rows. Its `КТР`
column, when present, gives the special-route flag of each Key2 for the trip rows
whose own flag is blank.

### `exitMarks`

One row per exit of the dispatch log, with the Key5 of the trip, the exit
number (both required), a "non-zero trips" flag and the number of trips. Only the rows flagged
`TRUE`, `ПРАВДА` or `1` count. When the flag is blank, the rows with at least
one trip count.

## Output

The output workbook contains three sheets:
* the result sheet (`ЭкспПоказ` by default), one row per reconciled trip
* `Duplicates`, the rows that share their Key5 with an earlier row
* `BranchTotals`, the totals of each branch without the duplicates

Unknown values are left blank. A blank is never the same as zero.

A JSON summary with the run statistics and the branch totals can be written
next to it, and compared against a reference summary.

## Configuration

```json
{
  "outputSettings": { "outputPath": "ЭП_итог.xlsx", "sheetName": "ЭкспПоказ" },
  "sources": {
    "trips":     { "filePath": "trips.xlsx", "excelWorksheetName": "Выпуск и рейсы КСУПТ" },
    "reference": { "filePath": "reference.xlsx", "departuresColumnIndex": "G" },
    "summary":   { "filePath": "trips.xlsx", "excelWorksheetName": "Sheet1" },
    "exitMarks": { "filePath": "exits.xlsx" }
  },
  "rules": { "allowedVehicleTypes": ["bus", "electricBus"], "dedupFirst": false }
}
```

Relative paths are resolved from the directory of the configuration file.

Rules:
- `specialRouteMarker` (string, default `гк`): the marker of special routes, as in `15к / гк-2`
- `allowedBranches` (array of strings, default `ЮЗ`, `СВ`, `СЗ`, `Ю`): the branch codes
  to keep. Other rows are dropped.
- `allowedVehicleTypes` (array of `bus`, `trolleybus`, `tram`, `electricBus`,
  default buses and electric buses)
- `dedupFirst` (boolean, default false): correct the representatives of each Key5 only.
  By default every row takes part in the correction, weighted by its own figures.

An unknown vehicle type name, an empty list or an empty marker fails the run
before any spreadsheet is read.

 */
